/// An axis-aligned face rectangle in frame pixel coordinates.
///
/// Produced fresh by every detection call and never persisted. Coordinates
/// may fall outside the frame; consumers clamp before touching pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from `[x1, y1, x2, y2]` corner coordinates, rounding
    /// outward so the box never shrinks below the detected extent.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let left = x1.min(x2).floor() as i32;
        let top = y1.min(y2).floor() as i32;
        let right = x1.max(x2).ceil() as i32;
        let bottom = y1.max(y2).ceil() as i32;
        Self::new(left, top, right - left, bottom - top)
    }

    /// Saturates at `i32::MAX` for boxes reaching past the coordinate range.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Grows the box by `padding` pixels on every side. Not clamped.
    pub fn expand(&self, padding: u32) -> Self {
        let p = padding.min(i32::MAX as u32 / 4) as i32;
        Self::new(
            self.x.saturating_sub(p),
            self.y.saturating_sub(p),
            self.width.saturating_add(p.saturating_mul(2)),
            self.height.saturating_add(p.saturating_mul(2)),
        )
    }

    /// Clamps the box into `[0, width) x [0, height)`.
    ///
    /// The result always covers at least one pixel: a box lying entirely
    /// outside the frame collapses onto the nearest edge pixel.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (x0, x1) = clamp_span(self.x, self.right(), width);
        let (y0, y1) = clamp_span(self.y, self.bottom(), height);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn iou(&self, other: &FaceBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let iw = (ix2 as i64 - ix1 as i64).max(0);
        let ih = (iy2 as i64 - iy1 as i64).max(0);
        let inter = iw as f64 * ih as f64;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() as f64 + other.area() as f64 - inter)
    }
}

fn clamp_span(start: i32, end: i32, limit: u32) -> (i32, i32) {
    let limit = limit.min(i32::MAX as u32) as i32;
    if limit <= 0 {
        return (0, 0);
    }
    let lo = start.clamp(0, limit - 1);
    let hi = end.clamp(lo + 1, limit);
    (lo, hi)
}
