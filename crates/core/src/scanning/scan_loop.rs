use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::detection::domain::face_detector::FaceDetector;
use crate::imaging::image_codec::{
    box_color_for, crop_with_padding, draw_boxes, encode_compressed, to_display_color_space,
};
use crate::remote::domain::directory_client::DirectoryClient;
use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::submission::SubmissionResult;
use crate::remote::domain::verification_client::VerificationClient;
use crate::scanning::events::{EventBus, ScanEvent};
use crate::scanning::face_policy::{classify, FaceVerdict, MULTIPLE_FACES_ADVISORY};
use crate::scanning::scan_error::ScanError;
use crate::scanning::submission_gate::{GateRefusal, SubmissionGate, SubmissionPermit};
use crate::shared::config::ScannerConfig;
use crate::shared::constants::{
    DEFAULT_CROP_PADDING, DEFAULT_JPEG_QUALITY, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_THROTTLE_WINDOW_MS,
};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Reads attempted before a one-shot capture gives up.
const CAPTURE_ATTEMPTS: usize = 10;
const OUTLINE_THICKNESS: u32 = 2;

/// Runtime knobs for the scanner.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanSettings {
    pub poll_interval: Duration,
    pub throttle_window: Duration,
    pub crop_padding: u32,
    pub jpeg_quality: u8,
    pub mode: ScanMode,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            throttle_window: Duration::from_millis(DEFAULT_THROTTLE_WINDOW_MS),
            crop_padding: DEFAULT_CROP_PADDING,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            mode: ScanMode::default(),
        }
    }
}

impl From<&ScannerConfig> for ScanSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            throttle_window: config.throttle_window(),
            crop_padding: config.crop_padding,
            jpeg_quality: config.jpeg_quality,
            mode: config.mode,
        }
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The source had nothing to offer.
    NoFrame,
    NoFace,
    MultipleFaces(usize),
    /// One face, but the previous attempt is too recent.
    Throttled,
    /// One face, but a submission is still in flight.
    Busy,
    /// A submission was handed to a worker thread.
    Submitted,
    /// The face could not be cropped or encoded.
    CaptureFailed,
}

/// State shared by the polling thread, submission workers and the
/// coordinator handle.
pub struct ScanContext {
    settings: ScanSettings,
    gate: Arc<SubmissionGate>,
    events: EventBus,
    verifier: Arc<dyn VerificationClient>,
    directory: Arc<dyn DirectoryClient>,
    mode: Mutex<ScanMode>,
    last_status: Mutex<String>,
    submission: Mutex<Option<JoinHandle<()>>>,
}

impl ScanContext {
    pub fn new(
        settings: ScanSettings,
        verifier: Arc<dyn VerificationClient>,
        directory: Arc<dyn DirectoryClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate: SubmissionGate::new(settings.throttle_window),
            mode: Mutex::new(settings.mode),
            settings,
            events: EventBus::new(),
            verifier,
            directory,
            last_status: Mutex::new(String::new()),
            submission: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn gate(&self) -> &Arc<SubmissionGate> {
        &self.gate
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryClient> {
        &self.directory
    }

    pub fn mode(&self) -> ScanMode {
        *lock(&self.mode)
    }

    pub fn set_mode(&self, mode: ScanMode) {
        *lock(&self.mode) = mode;
    }

    /// Emits a status change. Repeating the current status is a no-op.
    pub fn set_status(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut last = lock(&self.last_status);
            if *last == text {
                return;
            }
            last.clone_from(&text);
        }
        log::info!("Status: {text}");
        self.events.emit(ScanEvent::StatusChanged(text));
    }

    pub fn set_loading(&self, text: impl Into<String>) {
        self.events.emit(ScanEvent::LoadingChanged(text.into()));
    }

    /// Blocks until the most recent submission worker has finished.
    pub fn join_submission(&self) {
        let handle = lock(&self.submission).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("Submission worker panicked");
            }
        }
    }

    fn spawn_submission(self: &Arc<Self>, permit: SubmissionPermit, image: Vec<u8>) {
        let mode = self.mode();
        let context = self.clone();
        let handle = thread::spawn(move || {
            let _guard = ProcessingGuard::new(permit, context.clone(), "Sending to server...");
            context.set_status("Sending to server...");
            let result = context.verifier.verify(&image, mode);
            context.report(&result, mode);
            context.events.emit(ScanEvent::SubmissionCompleted(result));
        });
        *lock(&self.submission) = Some(handle);
    }

    fn report(&self, result: &SubmissionResult, mode: ScanMode) {
        match result {
            SubmissionResult::Verified { identity, .. } => {
                let enriched = match mode {
                    ScanMode::TimeIn => self.directory.fetch_profile(identity.as_str()),
                    ScanMode::TimeOut => None,
                };
                match enriched {
                    Some(profile) => self.set_status(format!(
                        "Success: {mode} recorded - User: {}",
                        profile.display_name()
                    )),
                    None => self.set_status(format!("Success: {mode} recorded")),
                }
            }
            SubmissionResult::Rejected { reason } => {
                self.set_status(format!("Failed: {reason}"));
            }
            SubmissionResult::TransportFailure { cause } => {
                log::warn!("Submission failed: {cause}");
                self.set_status(format!("Error: {cause}"));
            }
        }
    }
}

/// Holds the gate for the duration of one piece of work. Dropping it, on
/// any path, releases the gate and then clears the loading text.
pub struct ProcessingGuard {
    permit: Option<SubmissionPermit>,
    context: Arc<ScanContext>,
}

impl ProcessingGuard {
    pub fn new(permit: SubmissionPermit, context: Arc<ScanContext>, label: &str) -> Self {
        context.set_loading(label);
        Self {
            permit: Some(permit),
            context,
        }
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.context.set_loading("");
    }
}

pub(crate) enum Control {
    Stop,
    /// Grab one frame and detect faces in it.
    Capture(Sender<Result<(Frame, Vec<FaceBox>), ScanError>>),
}

/// Owns the camera and the detector and turns frames into decisions.
///
/// While scanning runs, the loop lives on the polling thread; otherwise
/// the coordinator keeps it.
pub struct ScanLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FaceDetector>,
    context: Arc<ScanContext>,
}

impl ScanLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn FaceDetector>,
        context: Arc<ScanContext>,
    ) -> Self {
        Self {
            source,
            detector,
            context,
        }
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.context
    }

    /// Brings the detector up if it isn't yet. Failure leaves detection
    /// returning no faces; it does not stop scanning.
    pub fn prepare_detector(&mut self) {
        if self.detector.is_ready() {
            return;
        }
        self.context.set_loading("Loading face detector...");
        if let Err(e) = self.detector.initialize() {
            log::warn!("Face detector failed to initialize: {e}");
            self.context.set_status(format!("Face detector unavailable: {e}"));
        }
        self.context.set_loading("");
    }

    pub fn open_source(&mut self) -> Result<(), CameraError> {
        self.source.open()
    }

    pub fn close_source(&mut self) {
        self.source.close();
    }

    pub fn tick(&mut self) -> TickOutcome {
        match self.source.read() {
            Some(frame) => self.process_frame(frame),
            None => TickOutcome::NoFrame,
        }
    }

    pub fn process_frame(&mut self, frame: Frame) -> TickOutcome {
        let faces = match self.detector.detect(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                self.context.set_status(format!("Face detection failed: {e}"));
                Vec::new()
            }
        };
        log::debug!("Frame {}: {} face(s)", frame.index(), faces.len());
        self.publish_frame(&frame, &faces);

        match classify(&faces) {
            FaceVerdict::NoFace => {
                self.context.events.emit(ScanEvent::NoFace);
                TickOutcome::NoFace
            }
            FaceVerdict::Multiple(count) => {
                self.context.events.emit(ScanEvent::MultipleFaces(count));
                self.context.set_status(MULTIPLE_FACES_ADVISORY);
                TickOutcome::MultipleFaces(count)
            }
            FaceVerdict::Single(face) => match self.context.gate.try_begin(frame.captured_at()) {
                Ok(permit) => self.submit(permit, &frame, &face),
                Err(GateRefusal::Busy) => TickOutcome::Busy,
                Err(GateRefusal::Throttled { remaining }) => {
                    log::debug!("Throttled for another {remaining:?}");
                    TickOutcome::Throttled
                }
            },
        }
    }

    fn publish_frame(&self, frame: &Frame, faces: &[FaceBox]) {
        if !self.context.events.wants_frames() {
            return;
        }
        let mut display = to_display_color_space(frame);
        draw_boxes(&mut display, faces, box_color_for(faces.len()), OUTLINE_THICKNESS);
        self.context.events.emit(ScanEvent::FrameReady {
            frame: Arc::new(display),
            faces: faces.to_vec(),
        });
    }

    fn submit(&self, permit: SubmissionPermit, frame: &Frame, face: &FaceBox) -> TickOutcome {
        let context = &self.context;
        context.set_status("Processing face...");
        let settings = context.settings();

        let encoded = crop_with_padding(frame, face, settings.crop_padding).and_then(|crop| {
            let bytes = encode_compressed(&crop, settings.jpeg_quality)?;
            Ok((crop, bytes))
        });
        match encoded {
            Ok((crop, bytes)) => {
                context
                    .events
                    .emit(ScanEvent::FaceCaptured(Arc::new(crop)));
                context.spawn_submission(permit, bytes);
                TickOutcome::Submitted
            }
            Err(e) => {
                log::warn!("Failed to prepare face image: {e}");
                context.set_status(format!("Failed to prepare face image: {e}"));
                drop(permit);
                TickOutcome::CaptureFailed
            }
        }
    }

    /// Grabs one frame and runs detection on it, opening the camera for
    /// just this capture if it is closed. The detector must come up.
    pub fn capture(&mut self) -> Result<(Frame, Vec<FaceBox>), ScanError> {
        let opened_here = !self.source.is_open();
        if opened_here {
            self.source.open()?;
        }
        let frame = self.read_with_retries();
        if opened_here {
            self.source.close();
        }
        let frame = frame.ok_or(ScanError::NoFrame)?;

        if !self.detector.is_ready() {
            self.detector.initialize()?;
        }
        let faces = self.detector.detect(&frame)?;
        Ok((frame, faces))
    }

    fn read_with_retries(&mut self) -> Option<Frame> {
        for attempt in 0..CAPTURE_ATTEMPTS {
            if let Some(frame) = self.source.read() {
                return Some(frame);
            }
            if attempt + 1 < CAPTURE_ATTEMPTS {
                thread::sleep(self.context.settings.poll_interval);
            }
        }
        None
    }

    /// Polling thread body. Returns the loop, with the camera closed, once
    /// told to stop or once the controller is gone.
    pub(crate) fn run(mut self, control: Receiver<Control>) -> Self {
        let ticker = crossbeam_channel::tick(self.context.settings.poll_interval);
        loop {
            select! {
                recv(control) -> msg => match msg {
                    Ok(Control::Capture(reply)) => {
                        let _ = reply.send(self.capture());
                    }
                    Ok(Control::Stop) | Err(_) => break,
                },
                recv(ticker) -> _ => {
                    self.tick();
                }
            }
        }
        self.source.close();
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
