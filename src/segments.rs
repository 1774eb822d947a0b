//! Timestamped transcript segments.

use serde::Serialize;

/// One recognized span of speech with its position in the source audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Segment start offset in seconds from the beginning of the upload.
    pub start_seconds: f32,
    /// Segment end offset in seconds.
    pub end_seconds: f32,
    /// Recognized text for this span, as emitted by the model.
    pub text: String,
}

impl Segment {
    /// Shift the segment in time, used when stitching per-chunk results back
    /// into a single timeline.
    pub fn offset_by(mut self, seconds: f32) -> Self {
        self.start_seconds += seconds;
        self.end_seconds += seconds;
        self
    }
}
