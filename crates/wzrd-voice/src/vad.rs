use crate::frame::AudioChunk;
use wzrd_types::voice::VadParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Quiet,
    Starting,
    Speaking,
    Stopping,
}

/// Turn boundary reported by [`VadAnalyzer::analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted,
    SpeechStopped,
}

/// Energy-based voice activity detector.
///
/// A chunk counts as speech when its RMS level reaches `min_volume`. Speech
/// must last `start_secs` before a turn starts and silence must last
/// `stop_secs` before it ends, so short blips and pauses are ignored.
#[derive(Debug, Clone)]
pub struct VadAnalyzer {
    params: VadParams,
    state: VadState,
    /// Samples seen in the current `Starting` or `Stopping` state.
    pending_samples: u64,
}

impl VadAnalyzer {
    pub fn new(params: VadParams) -> Self {
        Self {
            params,
            state: VadState::Quiet,
            pending_samples: 0,
        }
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, VadState::Speaking | VadState::Stopping)
    }

    pub fn analyze(&mut self, chunk: &AudioChunk) -> Option<VadEvent> {
        let voiced = chunk.rms() >= self.params.min_volume;
        let samples = chunk.num_samples() as u64;
        let rate = chunk.sample_rate;

        match (self.state, voiced) {
            (VadState::Quiet, true) => {
                self.state = VadState::Starting;
                self.pending_samples = samples;
                self.confirm_start(rate)
            }
            (VadState::Quiet, false) => None,
            (VadState::Starting, true) => {
                self.pending_samples += samples;
                self.confirm_start(rate)
            }
            (VadState::Starting, false) => {
                self.state = VadState::Quiet;
                self.pending_samples = 0;
                None
            }
            (VadState::Speaking, true) => None,
            (VadState::Speaking, false) => {
                self.state = VadState::Stopping;
                self.pending_samples = samples;
                self.confirm_stop(rate)
            }
            (VadState::Stopping, true) => {
                self.state = VadState::Speaking;
                self.pending_samples = 0;
                None
            }
            (VadState::Stopping, false) => {
                self.pending_samples += samples;
                self.confirm_stop(rate)
            }
        }
    }

    fn confirm_start(&mut self, sample_rate: u32) -> Option<VadEvent> {
        if self.pending_samples >= threshold_samples(self.params.start_secs, sample_rate) {
            self.state = VadState::Speaking;
            self.pending_samples = 0;
            Some(VadEvent::SpeechStarted)
        } else {
            None
        }
    }

    fn confirm_stop(&mut self, sample_rate: u32) -> Option<VadEvent> {
        if self.pending_samples >= threshold_samples(self.params.stop_secs, sample_rate) {
            self.state = VadState::Quiet;
            self.pending_samples = 0;
            Some(VadEvent::SpeechStopped)
        } else {
            None
        }
    }
}

/// Converts a duration to a whole number of samples, rounding to the nearest
/// sample so `0.5s` at 16 kHz is exactly 8000.
fn threshold_samples(secs: f32, sample_rate: u32) -> u64 {
    (f64::from(secs) * f64::from(sample_rate)).round().max(0.0) as u64
}
