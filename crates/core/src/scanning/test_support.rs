//! Scripted collaborators for driving the scanner without hardware or a
//! network.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::detection::domain::face_detector::{DetectionError, DetectorInitError, FaceDetector};
use crate::remote::domain::client_error::ClientError;
use crate::remote::domain::directory_client::DirectoryClient;
use crate::remote::domain::profile::{IdentityProfile, ProfileFields};
use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::submission::{Identity, SubmissionResult};
use crate::remote::domain::verification_client::VerificationClient;
use crate::scanning::events::ScanEvent;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::{Frame, PixelFormat};

/// A 200x160 RGB frame with a gradient so crops differ by position.
pub fn test_frame(index: usize, captured_at: Instant) -> Frame {
    let (w, h) = (200u32, 160u32);
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[x as u8, y as u8, ((x + y) / 2) as u8]);
        }
    }
    Frame::new(data, w, h, PixelFormat::Rgb8, index).with_captured_at(captured_at)
}

pub fn face_at(x: i32) -> FaceBox {
    FaceBox::new(x, 40, 50, 60)
}

pub fn verified_result(id: &str) -> SubmissionResult {
    SubmissionResult::Verified {
        identity: Identity::new(id),
        derived_status: "time-in".into(),
        record: None,
    }
}

/// Collects everything currently queued on an event receiver.
pub fn drain(rx: &Receiver<ScanEvent>) -> Vec<ScanEvent> {
    rx.try_iter().collect()
}

pub fn statuses(events: &[ScanEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::StatusChanged(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

// --- Stubs ---

#[derive(Default)]
pub struct SourceStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
}

/// Plays back a fixed list of frames, or repeats one frame forever.
pub struct StubSource {
    frames: VecDeque<Frame>,
    repeat: Option<Frame>,
    fail_open: bool,
    open: bool,
    next_index: usize,
    pub stats: Arc<SourceStats>,
}

impl StubSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            repeat: None,
            fail_open: false,
            open: false,
            next_index: 0,
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Every read returns a copy of `frame` stamped with the current time.
    pub fn repeating(frame: Frame) -> Self {
        Self {
            repeat: Some(frame),
            ..Self::new(Vec::new())
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }
}

impl FrameSource for StubSource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.fail_open {
            return Err(CameraError::Open {
                device: "stub".into(),
                reason: "unplugged".into(),
            });
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        if !self.open {
            return None;
        }
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(frame) = &self.repeat {
            self.next_index += 1;
            return Some(
                Frame::new(
                    frame.data().to_vec(),
                    frame.width(),
                    frame.height(),
                    frame.format(),
                    self.next_index,
                )
                .with_captured_at(Instant::now()),
            );
        }
        self.frames.pop_front()
    }

    fn close(&mut self) {
        if self.open {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Returns scripted box lists in order, then `fallback` forever.
pub struct StubDetector {
    script: VecDeque<Result<Vec<FaceBox>, String>>,
    fallback: Vec<FaceBox>,
    fail_init: bool,
    ready: bool,
    pub init_calls: Arc<AtomicUsize>,
}

impl StubDetector {
    pub fn new(script: Vec<Vec<FaceBox>>) -> Self {
        Self {
            script: script.into_iter().map(Ok).collect(),
            fallback: Vec::new(),
            fail_init: false,
            ready: false,
            init_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(faces: Vec<FaceBox>) -> Self {
        Self {
            fallback: faces,
            ..Self::new(Vec::new())
        }
    }

    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn then_error(mut self, message: &str) -> Self {
        self.script.push_back(Err(message.to_string()));
        self
    }
}

impl FaceDetector for StubDetector {
    fn initialize(&mut self) -> Result<(), DetectorInitError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(DetectorInitError::ModelUnavailable("offline".into()));
        }
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, DetectionError> {
        if !self.ready {
            return Ok(Vec::new());
        }
        match self.script.pop_front() {
            Some(Ok(faces)) => Ok(faces),
            Some(Err(message)) => Err(DetectionError::UnexpectedOutput(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Records every verify call and answers with a fixed result.
///
/// With a release channel, each call blocks until the test sends on it.
pub struct RecordingVerifier {
    pub calls: Mutex<Vec<(Vec<u8>, ScanMode)>>,
    result: SubmissionResult,
    release: Option<Receiver<()>>,
    panics: bool,
}

impl RecordingVerifier {
    pub fn new(result: SubmissionResult) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            result,
            release: None,
            panics: false,
        }
    }

    pub fn verified(id: &str) -> Self {
        Self::new(verified_result(id))
    }

    pub fn blocking(result: SubmissionResult, release: Receiver<()>) -> Self {
        Self {
            release: Some(release),
            ..Self::new(result)
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::verified("0")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl VerificationClient for RecordingVerifier {
    fn verify(&self, image: &[u8], mode: ScanMode) -> SubmissionResult {
        self.calls.lock().unwrap().push((image.to_vec(), mode));
        if self.panics {
            panic!("verifier exploded");
        }
        if let Some(release) = &self.release {
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        self.result.clone()
    }
}

/// In-memory directory that tracks live profiles and enrollments.
///
/// With a release channel, profile creation blocks until the test sends on
/// it.
#[derive(Default)]
pub struct RecordingDirectory {
    pub profiles: Mutex<Vec<IdentityProfile>>,
    pub enrolled: Mutex<Vec<(String, Vec<u8>)>>,
    pub fetches: AtomicUsize,
    pub fail_enroll: bool,
    pub known: Option<IdentityProfile>,
    created: AtomicBool,
    release: Option<Receiver<()>>,
}

impl RecordingDirectory {
    pub fn with_known(profile: IdentityProfile) -> Self {
        Self {
            known: Some(profile),
            ..Self::default()
        }
    }

    pub fn failing_enroll() -> Self {
        Self {
            fail_enroll: true,
            ..Self::default()
        }
    }

    pub fn blocking(release: Receiver<()>) -> Self {
        Self {
            release: Some(release),
            ..Self::default()
        }
    }

    pub fn was_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }
}

impl DirectoryClient for RecordingDirectory {
    fn create_profile(
        &self,
        _image: &[u8],
        fields: &ProfileFields,
    ) -> Result<IdentityProfile, ClientError> {
        self.created.store(true, Ordering::SeqCst);
        if let Some(release) = &self.release {
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        let mut profiles = self.profiles.lock().unwrap();
        let profile = IdentityProfile {
            id: (profiles.len() + 1).to_string(),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            email: fields.email.clone(),
            birth_date: Some(fields.birth_date.clone()),
            student_number: fields.student_number.clone(),
        };
        profiles.push(profile.clone());
        Ok(profile)
    }

    fn enroll_face(&self, id: &str, image: &[u8]) -> Result<(), ClientError> {
        if self.fail_enroll {
            return Err(ClientError::Status {
                status: 400,
                body: "no face found".into(),
            });
        }
        self.enrolled
            .lock()
            .unwrap()
            .push((id.to_string(), image.to_vec()));
        Ok(())
    }

    fn delete_profile(&self, id: &str) -> Result<(), ClientError> {
        self.profiles.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }

    fn fetch_profile(&self, id: &str) -> Option<IdentityProfile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.known.clone().filter(|p| p.id == id)
    }
}

pub fn student(id: &str) -> IdentityProfile {
    IdentityProfile {
        id: id.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        birth_date: Some("2001-12-10".into()),
        student_number: Some("S-1815".into()),
    }
}

pub fn valid_fields() -> ProfileFields {
    ProfileFields {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        birth_date: "2001-12-10".into(),
        student_number: Some("S-1815".into()),
    }
}
