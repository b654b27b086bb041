//! Frames: the units of data that move through a bot pipeline.

use crate::rtvi::RtviClientMessage;

/// A chunk of mono, signed 16-bit little-endian PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Self {
        Self { pcm, sample_rate }
    }

    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn num_samples(&self) -> usize {
        self.pcm.len() / 2
    }

    /// Playback length of the chunk in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square level, normalized to `0.0..=1.0`.
    pub fn rms(&self) -> f32 {
        let n = self.num_samples();
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .samples()
            .map(|s| {
                let v = s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        (sum / n as f64).sqrt() as f32
    }

    pub fn append(&mut self, other: &AudioChunk) {
        self.pcm.extend_from_slice(&other.pcm);
    }
}

/// Everything a pipeline stage can receive or emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// First frame of every run.
    Start,
    /// Microphone audio from the room.
    InputAudio(AudioChunk),
    /// Bot speech headed for the room.
    OutputAudio(AudioChunk),
    UserStartedSpeaking,
    UserStoppedSpeaking,
    BotStartedSpeaking,
    BotStoppedSpeaking,
    /// Text of what the user said.
    Transcription {
        text: String,
        user_id: String,
        is_final: bool,
    },
    /// Asks the LLM stage to respond to the current context.
    LlmRun,
    LlmResponseStart,
    LlmText(String),
    LlmResponseEnd,
    TtsStarted,
    TtsText(String),
    TtsStopped,
    /// Text of what the bot said.
    BotTranscription(String),
    /// A message from the client over the room's data channel.
    ClientMessage(RtviClientMessage),
    /// A non-fatal processing error to report to the client.
    Error(String),
    /// Last frame of every run.
    End,
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::InputAudio(_) => "input_audio",
            Self::OutputAudio(_) => "output_audio",
            Self::UserStartedSpeaking => "user_started_speaking",
            Self::UserStoppedSpeaking => "user_stopped_speaking",
            Self::BotStartedSpeaking => "bot_started_speaking",
            Self::BotStoppedSpeaking => "bot_stopped_speaking",
            Self::Transcription { .. } => "transcription",
            Self::LlmRun => "llm_run",
            Self::LlmResponseStart => "llm_response_start",
            Self::LlmText(_) => "llm_text",
            Self::LlmResponseEnd => "llm_response_end",
            Self::TtsStarted => "tts_started",
            Self::TtsText(_) => "tts_text",
            Self::TtsStopped => "tts_stopped",
            Self::BotTranscription(_) => "bot_transcription",
            Self::ClientMessage(_) => "client_message",
            Self::Error(_) => "error",
            Self::End => "end",
        }
    }
}
