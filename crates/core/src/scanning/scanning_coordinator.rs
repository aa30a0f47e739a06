use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::face_detector::FaceDetector;
use crate::imaging::image_codec::{crop_with_padding, encode_compressed};
use crate::remote::domain::directory_client::DirectoryClient;
use crate::remote::domain::profile::{IdentityProfile, ProfileFields};
use crate::remote::domain::scan_mode::ScanMode;
use crate::remote::domain::verification_client::VerificationClient;
use crate::scanning::events::ScanEvent;
use crate::scanning::face_policy::{classify, FaceVerdict};
use crate::scanning::scan_error::ScanError;
use crate::scanning::scan_loop::{Control, ProcessingGuard, ScanContext, ScanLoop, ScanSettings};
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// How long a registration waits for the polling thread to hand over a
/// frame.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the coordinator drives.
pub struct ScanDependencies {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn FaceDetector>,
    pub verifier: Arc<dyn VerificationClient>,
    pub directory: Arc<dyn DirectoryClient>,
}

enum LoopState {
    Idle(ScanLoop),
    Running(Poller),
    /// The polling thread panicked; camera and detector are gone.
    Lost,
}

struct Poller {
    control: Sender<Control>,
    handle: JoinHandle<ScanLoop>,
}

/// Drives camera polling, face detection, throttled submission and
/// registration, and reports progress as [`ScanEvent`]s.
///
/// `start` moves the camera and detector onto a polling thread; `stop`
/// joins that thread and takes them back. Submissions run on their own
/// worker threads and are never cancelled.
pub struct ScanningCoordinator {
    context: Arc<ScanContext>,
    state: Mutex<LoopState>,
}

impl ScanningCoordinator {
    pub fn new(deps: ScanDependencies, settings: ScanSettings) -> Self {
        let context = ScanContext::new(settings, deps.verifier, deps.directory);
        let scan_loop = ScanLoop::new(deps.source, deps.detector, context.clone());
        Self {
            context,
            state: Mutex::new(LoopState::Idle(scan_loop)),
        }
    }

    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.context.events().subscribe()
    }

    /// Like [`subscribe`](Self::subscribe) but without frame events.
    pub fn subscribe_without_frames(&self) -> Receiver<ScanEvent> {
        self.context.events().subscribe_without_frames()
    }

    pub fn mode(&self) -> ScanMode {
        self.context.mode()
    }

    /// Takes effect from the next submission on.
    pub fn set_mode(&self, mode: ScanMode) {
        log::info!("Scan mode set to {mode}");
        self.context.set_mode(mode);
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), LoopState::Running(_))
    }

    pub fn is_processing(&self) -> bool {
        self.context.gate().is_processing()
    }

    /// Blocks until the most recent submission has finished.
    pub fn join_submission(&self) {
        self.context.join_submission();
    }

    /// Waits for the detector, opens the camera and starts polling.
    ///
    /// A detector that fails to come up is reported but does not prevent
    /// scanning. A camera that fails to open leaves the coordinator idle.
    /// Starting a running coordinator does nothing.
    pub fn start(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state();
        let mut scan_loop = match mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Idle(scan_loop) => scan_loop,
            running @ LoopState::Running(_) => {
                *state = running;
                return Ok(());
            }
            LoopState::Lost => return Err(ScanError::Unavailable),
        };

        scan_loop.prepare_detector();
        if let Err(e) = scan_loop.open_source() {
            log::warn!("{e}");
            self.context.set_status("Failed to open camera");
            *state = LoopState::Idle(scan_loop);
            return Err(e.into());
        }

        let (control, control_rx) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || scan_loop.run(control_rx));
        *state = LoopState::Running(Poller { control, handle });

        log::info!("Scanning started");
        self.context.set_status("Camera started");
        Ok(())
    }

    /// Stops polling and closes the camera. An in-flight submission keeps
    /// running and still reports its result.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        let poller = match mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Running(poller) => poller,
            other => {
                *state = other;
                return;
            }
        };

        let _ = poller.control.send(Control::Stop);
        match poller.handle.join() {
            Ok(scan_loop) => *state = LoopState::Idle(scan_loop),
            Err(_) => log::warn!("Polling thread panicked; scanner is unavailable"),
        }

        log::info!("Scanning stopped");
        self.context.set_status("Camera stopped");
    }

    /// Registers a new person from a single live capture.
    ///
    /// Fields are checked before the camera is touched. The capture must
    /// hold exactly one face. Not throttled, but refused while a scan
    /// submission is in flight.
    pub fn register(&self, fields: &ProfileFields) -> Result<IdentityProfile, ScanError> {
        let result = self.register_inner(fields);
        if let Err(e) = &result {
            log::warn!("Registration failed: {e}");
            self.context.set_status(e.to_string());
        }
        result
    }

    fn register_inner(&self, fields: &ProfileFields) -> Result<IdentityProfile, ScanError> {
        fields.validate(chrono::Local::now().date_naive())?;
        let permit = self
            .context
            .gate()
            .try_begin_unthrottled()
            .map_err(|_| ScanError::Busy)?;
        let _guard = ProcessingGuard::new(permit, self.context.clone(), "Capturing face...");
        self.context.set_status("Capturing face...");

        let (frame, faces) = self.capture()?;
        let face = match classify(&faces) {
            FaceVerdict::Single(face) => face,
            FaceVerdict::NoFace => return Err(ScanError::NoFaceDetected),
            FaceVerdict::Multiple(count) => return Err(ScanError::MultipleFaces(count)),
        };

        let settings = self.context.settings();
        let crop = crop_with_padding(&frame, &face, settings.crop_padding)?;
        let image = encode_compressed(&crop, settings.jpeg_quality)?;
        self.context
            .events()
            .emit(ScanEvent::FaceCaptured(Arc::new(crop)));

        self.context.set_loading("Registering user...");
        self.context.set_status("Registering user...");
        let profile = self.context.directory().register(&image, fields)?;

        self.context.set_status("Registration successful!");
        Ok(profile)
    }

    fn capture(&self) -> Result<(Frame, Vec<FaceBox>), ScanError> {
        let mut state = self.lock_state();
        match &mut *state {
            LoopState::Idle(scan_loop) => scan_loop.capture(),
            LoopState::Running(poller) => {
                let (reply, reply_rx) = crossbeam_channel::bounded(1);
                poller
                    .control
                    .send(Control::Capture(reply))
                    .map_err(|_| ScanError::Unavailable)?;
                reply_rx
                    .recv_timeout(CAPTURE_TIMEOUT)
                    .map_err(|_| ScanError::NoFrame)?
            }
            LoopState::Lost => Err(ScanError::Unavailable),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ScanningCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::domain::directory_client::RegistrationError;
    use crate::remote::domain::profile::ValidationError;
    use crate::scanning::test_support::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn fast_settings() -> ScanSettings {
        ScanSettings {
            poll_interval: Duration::from_millis(5),
            ..ScanSettings::default()
        }
    }

    fn coordinator(
        source: StubSource,
        detector: StubDetector,
        verifier: Arc<RecordingVerifier>,
        directory: Arc<RecordingDirectory>,
    ) -> ScanningCoordinator {
        ScanningCoordinator::new(
            ScanDependencies {
                source: Box::new(source),
                detector: Box::new(detector),
                verifier,
                directory,
            },
            fast_settings(),
        )
    }

    fn wait_for(rx: &Receiver<ScanEvent>, pred: impl Fn(&ScanEvent) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) if pred(&event) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_start_and_stop_lifecycle() {
        let source = StubSource::repeating(test_frame(0, Instant::now()));
        let stats = source.stats.clone();
        let coordinator = coordinator(
            source,
            StubDetector::always(vec![]),
            Arc::new(RecordingVerifier::verified("1")),
            Arc::default(),
        );
        let events = coordinator.subscribe();

        coordinator.start().unwrap();
        assert!(coordinator.is_running());
        assert!(wait_for(&events, |e| matches!(e, ScanEvent::NoFace)));

        coordinator.stop();
        assert!(!coordinator.is_running());
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);

        let seen = statuses(&drain(&events));
        assert_eq!(seen.last().map(String::as_str), Some("Camera stopped"));
    }

    #[test]
    fn test_start_twice_is_noop_and_restart_works() {
        let source = StubSource::repeating(test_frame(0, Instant::now()));
        let stats = source.stats.clone();
        let coordinator = coordinator(
            source,
            StubDetector::always(vec![]),
            Arc::new(RecordingVerifier::verified("1")),
            Arc::default(),
        );

        coordinator.start().unwrap();
        coordinator.start().unwrap();
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        coordinator.stop();
        coordinator.stop();

        coordinator.start().unwrap();
        assert!(coordinator.is_running());
        coordinator.stop();
        assert_eq!(stats.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_camera_failure_leaves_coordinator_idle() {
        let coordinator = coordinator(
            StubSource::failing(),
            StubDetector::always(vec![]),
            Arc::new(RecordingVerifier::verified("1")),
            Arc::default(),
        );
        let events = coordinator.subscribe();

        let result = coordinator.start();

        assert!(matches!(result, Err(ScanError::Camera(_))));
        assert!(!coordinator.is_running());
        assert_eq!(
            statuses(&drain(&events)),
            vec!["Failed to open camera".to_string()]
        );
    }

    #[test]
    fn test_detector_failure_does_not_block_start() {
        let detector = StubDetector::failing_init();
        let init_calls = detector.init_calls.clone();
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            detector,
            Arc::new(RecordingVerifier::verified("1")),
            Arc::default(),
        );
        let events = coordinator.subscribe_without_frames();

        coordinator.start().unwrap();
        assert!(wait_for(&events, |e| matches!(e, ScanEvent::NoFace)));
        coordinator.stop();

        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_running_scan_submits_single_face() {
        let verifier = Arc::new(RecordingVerifier::verified("9"));
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            StubDetector::always(vec![face_at(40)]),
            verifier.clone(),
            Arc::default(),
        );
        let events = coordinator.subscribe_without_frames();

        coordinator.start().unwrap();
        assert!(wait_for(&events, |e| matches!(
            e,
            ScanEvent::SubmissionCompleted(_)
        )));
        coordinator.stop();
        coordinator.join_submission();

        // The default window allows a single attempt in this short run.
        assert_eq!(verifier.call_count(), 1);
        assert!(!coordinator.is_processing());
    }

    #[test]
    fn test_stop_does_not_abort_inflight_submission() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let verifier = Arc::new(RecordingVerifier::blocking(
            verified_result("3"),
            release_rx,
        ));
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            StubDetector::always(vec![face_at(40)]),
            verifier.clone(),
            Arc::default(),
        );
        let events = coordinator.subscribe_without_frames();

        coordinator.start().unwrap();
        assert!(wait_for(&events, |e| matches!(e, ScanEvent::FaceCaptured(_))));
        coordinator.stop();
        assert!(coordinator.is_processing());

        release_tx.send(()).unwrap();
        assert!(wait_for(&events, |e| matches!(
            e,
            ScanEvent::SubmissionCompleted(r) if r.is_verified()
        )));
        coordinator.join_submission();
        assert!(!coordinator.is_processing());
    }

    #[test]
    fn test_register_success_while_idle() {
        let source = StubSource::new(vec![test_frame(0, Instant::now())]);
        let stats = source.stats.clone();
        let directory = Arc::new(RecordingDirectory::default());
        let coordinator = coordinator(
            source,
            StubDetector::always(vec![face_at(40)]),
            Arc::new(RecordingVerifier::verified("1")),
            directory.clone(),
        );
        let events = coordinator.subscribe_without_frames();

        let profile = coordinator.register(&valid_fields()).unwrap();

        assert_eq!(profile.first_name, "Ada");
        assert_eq!(directory.enrolled.lock().unwrap().len(), 1);
        assert_eq!(directory.enrolled.lock().unwrap()[0].0, profile.id);
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_processing());
        assert_eq!(
            statuses(&drain(&events)),
            vec![
                "Capturing face...".to_string(),
                "Registering user...".to_string(),
                "Registration successful!".to_string(),
            ]
        );
    }

    #[test]
    fn test_register_while_running_uses_polling_thread() {
        let directory = Arc::new(RecordingDirectory::default());
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            StubDetector::always(vec![]),
            Arc::new(RecordingVerifier::verified("1")),
            directory.clone(),
        );
        coordinator.start().unwrap();

        let result = coordinator.register(&valid_fields());
        coordinator.stop();

        assert!(matches!(result, Err(ScanError::NoFaceDetected)));
        assert!(!directory.was_created());
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_register_while_running_succeeds_and_holds_off_scan_submissions() {
        let source = StubSource::repeating(test_frame(0, Instant::now()));
        let stats = source.stats.clone();
        let (release, release_rx) = crossbeam_channel::bounded(1);
        let directory = Arc::new(RecordingDirectory::blocking(release_rx));
        let verifier = Arc::new(RecordingVerifier::verified("1"));
        let coordinator = ScanningCoordinator::new(
            ScanDependencies {
                source: Box::new(source),
                detector: Box::new(StubDetector::always(vec![face_at(40)])),
                verifier: verifier.clone(),
                directory: directory.clone(),
            },
            ScanSettings {
                poll_interval: Duration::from_millis(5),
                throttle_window: Duration::from_millis(20),
                ..ScanSettings::default()
            },
        );
        coordinator.start().unwrap();
        assert!(wait_until(|| verifier.call_count() >= 1));

        thread::scope(|scope| {
            let registration = scope.spawn(|| {
                // A scan submission may still hold the gate when we first try.
                for _ in 0..100 {
                    match coordinator.register(&valid_fields()) {
                        Err(ScanError::Busy) => thread::sleep(Duration::from_millis(2)),
                        other => return other,
                    }
                }
                Err(ScanError::Busy)
            });

            assert!(wait_until(|| directory.was_created()));
            let submitted = verifier.call_count();
            let reads = stats.reads.load(Ordering::SeqCst);
            // Many throttle windows pass with a single face in every frame.
            assert!(wait_until(|| stats.reads.load(Ordering::SeqCst) >= reads + 20));
            assert!(coordinator.is_processing());
            assert_eq!(verifier.call_count(), submitted);

            release.send(()).unwrap();
            let profile = registration.join().unwrap().unwrap();
            assert_eq!(profile.full_name(), "Ada Lovelace");
            assert_eq!(directory.enrolled.lock().unwrap().len(), 1);
            assert!(wait_until(|| verifier.call_count() > submitted));
        });

        coordinator.stop();
        coordinator.join_submission();
    }

    #[test]
    fn test_register_rejects_invalid_fields_before_capture() {
        let source = StubSource::new(vec![test_frame(0, Instant::now())]);
        let stats = source.stats.clone();
        let directory = Arc::new(RecordingDirectory::default());
        let coordinator = coordinator(
            source,
            StubDetector::always(vec![face_at(40)]),
            Arc::new(RecordingVerifier::verified("1")),
            directory.clone(),
        );
        let fields = ProfileFields {
            email: "not-an-email".into(),
            ..valid_fields()
        };

        let result = coordinator.register(&fields);

        assert!(matches!(
            result,
            Err(ScanError::Validation(ValidationError::InvalidEmail))
        ));
        assert_eq!(stats.opens.load(Ordering::SeqCst), 0);
        assert!(!directory.was_created());
    }

    #[rstest::rstest]
    #[case(vec![], "none")]
    #[case(vec![face_at(10), face_at(120)], "multiple")]
    fn test_register_requires_exactly_one_face(#[case] faces: Vec<FaceBox>, #[case] label: &str) {
        let directory = Arc::new(RecordingDirectory::default());
        let coordinator = coordinator(
            StubSource::new(vec![test_frame(0, Instant::now())]),
            StubDetector::always(faces),
            Arc::new(RecordingVerifier::verified("1")),
            directory.clone(),
        );

        let result = coordinator.register(&valid_fields());

        match label {
            "none" => assert!(matches!(result, Err(ScanError::NoFaceDetected))),
            _ => assert!(matches!(result, Err(ScanError::MultipleFaces(2)))),
        }
        assert!(!directory.was_created());
        assert!(!coordinator.is_processing());
    }

    #[test]
    fn test_register_rolls_back_on_enroll_failure() {
        let directory = Arc::new(RecordingDirectory::failing_enroll());
        let coordinator = coordinator(
            StubSource::new(vec![test_frame(0, Instant::now())]),
            StubDetector::always(vec![face_at(40)]),
            Arc::new(RecordingVerifier::verified("1")),
            directory.clone(),
        );
        let events = coordinator.subscribe_without_frames();

        let result = coordinator.register(&valid_fields());

        assert!(matches!(
            result,
            Err(ScanError::Registration(RegistrationError::RolledBack { .. }))
        ));
        assert!(directory.was_created());
        assert!(directory.profiles.lock().unwrap().is_empty());
        assert!(statuses(&drain(&events))
            .last()
            .is_some_and(|s| s.starts_with("Registration failed")));
    }

    #[test]
    fn test_register_refused_while_submission_in_flight() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let verifier = Arc::new(RecordingVerifier::blocking(
            verified_result("3"),
            release_rx,
        ));
        let directory = Arc::new(RecordingDirectory::default());
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            StubDetector::always(vec![face_at(40)]),
            verifier,
            directory.clone(),
        );
        let events = coordinator.subscribe_without_frames();
        coordinator.start().unwrap();
        assert!(wait_for(&events, |e| matches!(e, ScanEvent::FaceCaptured(_))));

        let result = coordinator.register(&valid_fields());

        assert!(matches!(result, Err(ScanError::Busy)));
        assert!(!directory.was_created());
        release_tx.send(()).unwrap();
        coordinator.stop();
        coordinator.join_submission();
    }

    #[test]
    fn test_set_mode_applies_to_next_submission() {
        let verifier = Arc::new(RecordingVerifier::verified("5"));
        let coordinator = coordinator(
            StubSource::repeating(test_frame(0, Instant::now())),
            StubDetector::always(vec![face_at(40)]),
            verifier.clone(),
            Arc::default(),
        );
        coordinator.set_mode(ScanMode::TimeOut);
        assert_eq!(coordinator.mode(), ScanMode::TimeOut);
        let events = coordinator.subscribe_without_frames();

        coordinator.start().unwrap();
        assert!(wait_for(&events, |e| matches!(
            e,
            ScanEvent::SubmissionCompleted(_)
        )));
        coordinator.stop();
        coordinator.join_submission();

        assert_eq!(verifier.calls.lock().unwrap()[0].1, ScanMode::TimeOut);
    }
}
