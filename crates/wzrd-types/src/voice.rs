//! Voice transport and speech-service parameters.
//!
//! These types describe how the bot joins a room and how the realtime
//! model speaks. They are plain configuration; the stages in `wzrd-voice`
//! consume them.

use serde::{Deserialize, Serialize};

/// Prebuilt voices offered by the multimodal live model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    #[default]
    Aoede,
}

impl GeminiVoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }
}

impl std::str::FromStr for GeminiVoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Puck" => Ok(Self::Puck),
            "Charon" => Ok(Self::Charon),
            "Kore" => Ok(Self::Kore),
            "Fenrir" => Ok(Self::Fenrir),
            "Aoede" => Ok(Self::Aoede),
            other => Err(format!("unknown voice: {other}")),
        }
    }
}

/// Voice activity detection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadParams {
    /// Seconds of continuous speech before a turn is considered started.
    pub start_secs: f32,
    /// Seconds of silence before a turn is considered finished.
    pub stop_secs: f32,
    /// Normalized RMS level (0.0..=1.0) above which a chunk counts as speech.
    pub min_volume: f32,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            start_secs: 0.2,
            stop_secs: 0.8,
            min_volume: 0.02,
        }
    }
}

/// Room transport settings for the bot participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportParams {
    pub audio_in_sample_rate: u32,
    pub audio_out_enabled: bool,
    pub audio_out_sample_rate: u32,
    /// Room-side transcription. The multimodal model transcribes instead.
    pub transcription_enabled: bool,
    pub vad_enabled: bool,
    pub vad: VadParams,
    /// Forward raw input audio downstream even while VAD is running.
    pub vad_audio_passthrough: bool,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            audio_in_sample_rate: 16_000,
            audio_out_enabled: true,
            audio_out_sample_rate: 24_000,
            transcription_enabled: false,
            vad_enabled: true,
            vad: VadParams {
                stop_secs: 0.5,
                ..VadParams::default()
            },
            vad_audio_passthrough: true,
        }
    }
}

/// Which video feed of a participant to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoSource {
    Camera,
    ScreenVideo,
}

impl VideoSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::ScreenVideo => "screenVideo",
        }
    }
}

/// A remote participant in the bot's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}
