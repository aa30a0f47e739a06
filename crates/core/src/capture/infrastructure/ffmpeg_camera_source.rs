use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::shared::frame::{Frame, PixelFormat};

#[cfg(target_os = "linux")]
const DEVICE_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const DEVICE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const DEVICE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DEVICE_FORMAT: &str = "v4l2";

#[cfg(target_os = "macos")]
pub const DEFAULT_DEVICE: &str = "0";
#[cfg(target_os = "windows")]
pub const DEFAULT_DEVICE: &str = "video=Integrated Camera";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// Captures from a local camera through libavdevice.
///
/// Frames are delivered as BGR24, the channel order capture hardware
/// conventionally uses.
pub struct FfmpegCameraSource {
    device: String,
    video_size: Option<(u32, u32)>,
    framerate: Option<u32>,
    capture: Option<OpenCapture>,
    frame_index: usize,
}

struct OpenCapture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    stream_index: usize,
}

// Safety: FfmpegCameraSource is owned by the polling thread and only used
// from one thread at a time. The raw pointers inside ffmpeg types are not
// shared across threads.
unsafe impl Send for FfmpegCameraSource {}

impl FfmpegCameraSource {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            video_size: None,
            framerate: None,
            capture: None,
            frame_index: 0,
        }
    }

    pub fn with_video_size(mut self, width: u32, height: u32) -> Self {
        self.video_size = Some((width, height));
        self
    }

    pub fn with_framerate(mut self, fps: u32) -> Self {
        self.framerate = Some(fps);
        self
    }

    fn open_error(&self, reason: impl ToString) -> CameraError {
        CameraError::Open {
            device: self.device.clone(),
            reason: reason.to_string(),
        }
    }

    fn open_capture(&self) -> Result<OpenCapture, CameraError> {
        ffmpeg_next::init().map_err(|e| self.open_error(e))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == DEVICE_FORMAT)
            .ok_or_else(|| self.open_error(format!("input format {DEVICE_FORMAT} unavailable")))?;

        let mut options = ffmpeg_next::Dictionary::new();
        if let Some((w, h)) = self.video_size {
            options.set("video_size", &format!("{w}x{h}"));
        }
        if let Some(fps) = self.framerate {
            options.set("framerate", &fps.to_string());
        }

        let context = ffmpeg_next::format::open_with(
            &self.device,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )
        .map_err(|e| self.open_error(e))?;
        let ffmpeg_next::format::context::Context::Input(ictx) = context else {
            return Err(self.open_error("device opened as output"));
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| self.open_error("no video stream"))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.open_error(e))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| self.open_error(e))?;

        Ok(OpenCapture {
            ictx,
            decoder,
            scaler: None,
            stream_index,
        })
    }
}

impl FrameSource for FfmpegCameraSource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.capture.is_some() {
            return Ok(());
        }
        let capture = self.open_capture()?;
        log::info!(
            "Camera {} opened ({}x{})",
            self.device,
            capture.decoder.width(),
            capture.decoder.height()
        );
        self.capture = Some(capture);
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        let capture = self.capture.as_mut()?;
        match capture.next_frame() {
            Ok(Some((pixels, width, height))) => {
                let frame = Frame::new(pixels, width, height, PixelFormat::Bgr8, self.frame_index);
                self.frame_index += 1;
                Some(frame)
            }
            Ok(None) => None,
            Err(e) => {
                log::debug!("Camera read failed: {e}");
                None
            }
        }
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            log::info!("Camera {} closed", self.device);
        }
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl OpenCapture {
    /// Reads packets until one decoded frame is available.
    ///
    /// Returns `Ok(None)` if the device produced nothing decodable.
    fn next_frame(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>, ffmpeg_next::Error> {
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                return Ok(None);
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>, ffmpeg_next::Error> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let width = decoded.width();
        let height = decoded.height();

        if self.scaler.is_none() {
            self.scaler = Some(ffmpeg_next::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg_next::format::Pixel::BGR24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut bgr = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&decoded, &mut bgr)?;
        Ok(Some((extract_packed_pixels(&bgr, width, height), width, height)))
    }
}

/// Copies a packed 3-channel frame into a contiguous buffer, dropping the
/// per-row stride padding ffmpeg may add.
fn extract_packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
