//! Pure raster operations used on the submission and display paths.
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use thiserror::Error;

use crate::shared::face_box::FaceBox;
use crate::shared::frame::{Frame, PixelFormat};

/// Outline color when exactly one face is in view.
pub const SINGLE_FACE_COLOR: [u8; 3] = [0, 255, 0];
/// Outline color when zero or several faces are in view.
pub const REJECTED_FACE_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("frame is empty")]
    EmptyFrame,
    #[error("JPEG quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
}

/// Crops `face` grown by `padding` on every side, clamped to the frame.
///
/// The crop always lies inside the source and is never empty: a box
/// entirely outside the frame yields a 1x1 crop at the nearest edge.
pub fn crop_with_padding(frame: &Frame, face: &FaceBox, padding: u32) -> Result<Frame, CodecError> {
    if frame.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    let region = face.expand(padding).clamp_to(frame.width(), frame.height());
    let (x0, y0) = (region.x as usize, region.y as usize);
    let (w, h) = (region.width as usize, region.height as usize);

    let channels = frame.channels() as usize;
    let src_stride = frame.width() as usize * channels;
    let row_len = w * channels;
    let mut data = Vec::with_capacity(row_len * h);
    for row in y0..y0 + h {
        let start = row * src_stride + x0 * channels;
        data.extend_from_slice(&frame.data()[start..start + row_len]);
    }

    Ok(
        Frame::new(data, w as u32, h as u32, frame.format(), frame.index())
            .with_captured_at(frame.captured_at()),
    )
}

/// Converts a frame to RGB for display. RGB frames pass through unchanged.
pub fn to_display_color_space(frame: &Frame) -> Frame {
    match frame.format() {
        PixelFormat::Rgb8 => frame.clone(),
        PixelFormat::Bgr8 => {
            let mut data = frame.data().to_vec();
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Frame::new(data, frame.width(), frame.height(), PixelFormat::Rgb8, frame.index())
                .with_captured_at(frame.captured_at())
        }
    }
}

/// Encodes a frame as JPEG at `quality` (1-100).
pub fn encode_compressed(frame: &Frame, quality: u8) -> Result<Vec<u8>, CodecError> {
    if !(1..=100).contains(&quality) {
        return Err(CodecError::InvalidQuality(quality));
    }
    if frame.is_empty() {
        return Err(CodecError::EmptyFrame);
    }
    let rgb = to_display_color_space(frame);

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(rgb.data(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(CodecError::Encode)?;
    Ok(buf.into_inner())
}

/// Decodes any format the `image` crate understands into an RGB frame.
pub fn decode(bytes: &[u8], index: usize) -> Result<Frame, CodecError> {
    let img = image::load_from_memory(bytes).map_err(CodecError::Decode)?;
    Ok(from_rgb_image(img.to_rgb8(), index))
}

pub fn from_rgb_image(img: RgbImage, index: usize) -> Frame {
    let (width, height) = img.dimensions();
    Frame::new(img.into_raw(), width, height, PixelFormat::Rgb8, index)
}

/// Outline color for a tick that saw `face_count` faces.
pub fn box_color_for(face_count: usize) -> [u8; 3] {
    if face_count == 1 {
        SINGLE_FACE_COLOR
    } else {
        REJECTED_FACE_COLOR
    }
}

/// Draws rectangle outlines in place. Boxes are clamped to the frame.
pub fn draw_boxes(frame: &mut Frame, boxes: &[FaceBox], color: [u8; 3], thickness: u32) {
    if frame.is_empty() || thickness == 0 {
        return;
    }
    let (fw, fh) = (frame.width(), frame.height());
    for face in boxes {
        let b = face.clamp_to(fw, fh);
        let (x0, y0) = (b.x as u32, b.y as u32);
        let (x1, y1) = (b.right() as u32, b.bottom() as u32);
        let t = thickness.min(b.width as u32).min(b.height as u32).max(1);

        for y in y0..y1 {
            for x in x0..x1 {
                let on_edge = y < y0 + t || y >= y1 - t || x < x0 + t || x >= x1 - t;
                if on_edge {
                    frame.set_rgb(x, y, color);
                }
            }
        }
    }
}
