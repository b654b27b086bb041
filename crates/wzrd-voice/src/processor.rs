use crate::error::VoiceError;
use crate::frame::Frame;
use async_trait::async_trait;

/// One stage of a bot pipeline.
///
/// A stage receives each frame that reaches it, in order, and returns the
/// frames to hand to the next stage: the input itself when passing it
/// through, nothing when consuming it, or several frames when expanding it.
/// An `Err` aborts the whole pipeline run.
#[async_trait]
pub trait FrameProcessor: Send {
    /// Stable stage name, used in logs and for inspecting pipeline order.
    fn name(&self) -> &'static str;

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError>;
}
