use crate::detection::domain::detection_params::DetectionParams;
use crate::shared::face_box::FaceBox;

/// A raw detector hit in frame coordinates, before merging.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

impl Candidate {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    fn iou(&self, other: &Candidate) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.x2 - self.x1) * (self.y2 - self.y1);
        let area_b = (other.x2 - other.x1) * (other.y2 - other.y1);
        inter / (area_a + area_b - inter)
    }
}

/// Collapses overlapping candidates into face boxes.
///
/// Greedy NMS by descending score. Each kept candidate counts how many
/// lower-scored candidates it absorbed; it survives only if that count
/// reaches `min_neighbors` and its box is at least `min_size` on both sides.
/// Output is ordered by score, highest first.
pub fn merge_candidates(mut candidates: Vec<Candidate>, params: &DetectionParams) -> Vec<FaceBox> {
    candidates.retain(|c| c.score >= params.confidence);
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; candidates.len()];
    let mut faces = Vec::new();

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0usize;
        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            if candidates[i].iou(&candidates[j]) > params.overlap_iou {
                suppressed[j] = true;
                neighbors += 1;
            }
        }
        if neighbors < params.min_neighbors {
            continue;
        }

        let c = &candidates[i];
        let face = FaceBox::from_corners(c.x1, c.y1, c.x2, c.y2);
        let min = params.min_size.min(i32::MAX as u32) as i32;
        if face.width < min || face.height < min {
            continue;
        }
        faces.push(face);
    }
    faces
}
