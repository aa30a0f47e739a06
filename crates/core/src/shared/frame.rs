use std::time::Instant;

use ndarray::ArrayView3;

/// Channel order of a packed 8-bit, three-channel raster.
///
/// Capture devices commonly deliver BGR; display and JPEG encoding want RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    pub fn channels(self) -> u8 {
        3
    }

    /// Byte offsets of the red, green and blue samples within one pixel.
    pub fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelFormat::Rgb8 => [0, 1, 2],
            PixelFormat::Bgr8 => [2, 1, 0],
        }
    }
}

/// A single captured frame: contiguous packed pixels in row-major order,
/// plus the monotonic instant it was captured at.
///
/// A frame is owned by its source until handed to the coordinator for one
/// tick. Anything that outlives the tick (display, crops) is an explicit clone.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    index: usize,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (format.channels() as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            format,
            index,
            captured_at: Instant::now(),
        }
    }

    /// Overrides the capture instant. Sources stamp frames when they are
    /// read; replayed or synthetic frames can carry their own timeline.
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> u8 {
        self.format.channels()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the pixel at `(x, y)` as `[r, g, b]` regardless of layout.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = self.offset(x, y);
        let [r, g, b] = self.format.rgb_offsets();
        [
            self.data[offset + r],
            self.data[offset + g],
            self.data[offset + b],
        ]
    }

    /// Writes an `[r, g, b]` pixel at `(x, y)` in the frame's own layout.
    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let offset = self.offset(x, y);
        let [r, g, b] = self.format.rgb_offsets();
        self.data[offset + r] = rgb[0];
        self.data[offset + g] = rgb[1];
        self.data[offset + b] = rgb[2];
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * (self.channels() as usize)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels() as usize,
        )
    }
}
