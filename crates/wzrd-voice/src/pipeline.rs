use crate::error::VoiceError;
use crate::frame::Frame;
use crate::processor::FrameProcessor;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// An ordered chain of stages. Frames enter at the first stage and whatever
/// the last stage emits leaves the pipeline.
pub struct Pipeline {
    stages: Vec<Box<dyn FrameProcessor>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn FrameProcessor>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Pushes one frame through every stage and returns what comes out of
    /// the far end.
    pub async fn push(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let mut frames = vec![frame];

        for stage in &mut self.stages {
            let mut next = Vec::with_capacity(frames.len());
            for frame in frames {
                next.extend(stage.process(frame).await?);
            }
            frames = next;
            if frames.is_empty() {
                break;
            }
        }

        Ok(frames)
    }

    /// Drives the pipeline until an end frame arrives or the source closes.
    ///
    /// A `Start` frame is pushed first and an `End` frame last, so every
    /// stage sees a complete run even when the source simply hangs up.
    pub async fn run(mut self, mut source: mpsc::Receiver<Frame>) -> Result<(), VoiceError> {
        info!(stages = ?self.stage_names(), "pipeline started");
        self.push(Frame::Start).await?;

        loop {
            match source.recv().await {
                Some(Frame::End) | None => break,
                Some(frame) => {
                    debug!(frame = frame.kind(), "pipeline frame");
                    self.push(frame).await?;
                }
            }
        }

        self.push(Frame::End).await?;
        info!("pipeline finished");
        Ok(())
    }
}
