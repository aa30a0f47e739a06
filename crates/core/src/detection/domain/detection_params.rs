use serde::{Deserialize, Serialize};

/// Fixed detector tuning. Set once at construction, never per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Minimum candidate score to consider at all (0.0-1.0).
    pub confidence: f64,
    /// IoU above which two candidates are treated as the same face.
    pub overlap_iou: f64,
    /// How many overlapping candidates a face must absorb to be accepted.
    /// Isolated single hits are usually noise.
    pub min_neighbors: usize,
    /// Faces narrower or shorter than this (in frame pixels) are dropped.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            overlap_iou: 0.45,
            min_neighbors: 1,
            min_size: 30,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.overlap_iou) {
            return Err(format!(
                "overlap_iou must be between 0.0 and 1.0, got {}",
                self.overlap_iou
            ));
        }
        Ok(())
    }
}
