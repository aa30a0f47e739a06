use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::select;

use attendance_core::capture::domain::frame_source::FrameSource;
#[cfg(feature = "ffmpeg")]
use attendance_core::capture::infrastructure::ffmpeg_camera_source::{
    FfmpegCameraSource, DEFAULT_DEVICE,
};
use attendance_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use attendance_core::detection::domain::face_detector::FaceDetector;
use attendance_core::detection::infrastructure::model_loader::ModelLoader;
use attendance_core::detection::infrastructure::model_resolver::ModelSource;
use attendance_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use attendance_core::remote::domain::directory_client::DirectoryClient;
use attendance_core::remote::domain::profile::ProfileFields;
use attendance_core::remote::domain::scan_mode::ScanMode;
use attendance_core::remote::domain::submission::SubmissionResult;
use attendance_core::remote::domain::verification_client::VerificationClient;
use attendance_core::remote::infrastructure::http_attendance_client::HttpAttendanceClient;
use attendance_core::remote::infrastructure::http_directory_client::HttpDirectoryClient;
use attendance_core::remote::infrastructure::http_verify_client::HttpVerifyClient;
use attendance_core::scanning::events::ScanEvent;
use attendance_core::scanning::scan_loop::ScanSettings;
use attendance_core::scanning::scanning_coordinator::{ScanDependencies, ScanningCoordinator};
use attendance_core::shared::config::ScannerConfig;

/// Camera-based attendance: scan faces, record time-in/time-out, register
/// new people.
#[derive(Parser)]
#[command(name = "attendance")]
struct Cli {
    /// JSON config file (defaults to the platform config location).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan continuously and record attendance for each recognized face.
    Scan {
        /// time-in or time-out.
        #[arg(long)]
        mode: Option<ScanMode>,

        #[command(flatten)]
        input: InputArgs,

        /// Which service verifies faces.
        #[arg(long, value_enum, default_value = "attendance")]
        backend: Backend,

        /// Stop after this many seconds (runs until Ctrl-C otherwise).
        #[arg(long)]
        duration: Option<u64>,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Capture one face and register a new person with it.
    Register {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        email: String,

        /// YYYY-MM-DD
        #[arg(long)]
        birth_date: String,

        #[arg(long)]
        student_number: Option<String>,

        #[command(flatten)]
        input: InputArgs,
    },
    /// Run one still image through detection and verification.
    Verify {
        image: PathBuf,

        #[arg(long)]
        mode: Option<ScanMode>,

        #[arg(long, value_enum, default_value = "attendance")]
        backend: Backend,
    },
    /// Look up a registered person by id.
    Profile { id: String },
}

#[derive(Args)]
struct InputArgs {
    /// Camera device (platform default if omitted).
    #[arg(long, conflicts_with = "images")]
    device: Option<String>,

    /// Image file or directory to replay instead of a camera.
    #[arg(long)]
    images: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Attendance service: verifies and records in one call.
    Attendance,
    /// Recognition service: verifies only.
    Recognition,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scan {
            mode,
            input,
            backend,
            duration,
            confidence,
        } => {
            apply_overrides(&mut config, mode, confidence)?;
            run_scan(&config, &input, backend, duration.map(Duration::from_secs))
        }
        Command::Register {
            first_name,
            last_name,
            email,
            birth_date,
            student_number,
            input,
        } => {
            let fields = ProfileFields {
                first_name,
                last_name,
                email,
                birth_date,
                student_number,
            };
            apply_overrides(&mut config, None, None)?;
            run_register(&config, &input, &fields)
        }
        Command::Verify {
            image,
            mode,
            backend,
        } => {
            apply_overrides(&mut config, mode, None)?;
            run_verify(&config, &image, backend)
        }
        Command::Profile { id } => run_profile(&config, &id),
    }
}

fn run_scan(
    config: &ScannerConfig,
    input: &InputArgs,
    backend: Backend,
    duration: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = build_coordinator(config, open_source(input)?, backend)?;
    let events = coordinator.subscribe_without_frames();

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;
    let deadline = match duration {
        Some(d) => crossbeam_channel::after(d),
        None => crossbeam_channel::never(),
    };

    log::info!("Scanning in {} mode", config.mode);
    coordinator.start()?;
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => print_event(&event),
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
            recv(deadline) -> _ => break,
        }
    }

    coordinator.stop();
    coordinator.join_submission();
    events.try_iter().for_each(|e| print_event(&e));
    Ok(())
}

fn run_register(
    config: &ScannerConfig,
    input: &InputArgs,
    fields: &ProfileFields,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = build_coordinator(config, open_source(input)?, Backend::Attendance)?;
    let profile = coordinator.register(fields)?;
    println!("Registered {} (id {})", profile.display_name(), profile.id);
    Ok(())
}

fn run_verify(
    config: &ScannerConfig,
    image: &Path,
    backend: Backend,
) -> Result<(), Box<dyn std::error::Error>> {
    if !image.exists() {
        return Err(format!("Input file not found: {}", image.display()).into());
    }
    let source = Box::new(ImageSequenceSource::new(image).once());
    let coordinator = build_coordinator(config, source, backend)?;
    let events = coordinator.subscribe_without_frames();
    coordinator.start()?;

    // Detector is already up once start returns, so only the request
    // itself needs to fit in this budget.
    let timeout = crossbeam_channel::after(config.request_timeout() + Duration::from_secs(5));
    let outcome = loop {
        select! {
            recv(events) -> event => match event {
                Ok(ScanEvent::SubmissionCompleted(result)) => break Ok(result),
                Ok(ScanEvent::NoFace) => break Err("No face found in image".to_string()),
                Ok(ScanEvent::MultipleFaces(n)) => {
                    break Err(format!("Found {n} faces in image, expected one"))
                }
                Ok(other) => print_event(&other),
                Err(_) => break Err("Scanner stopped unexpectedly".to_string()),
            },
            recv(timeout) -> _ => break Err("Timed out waiting for verification".to_string()),
        }
    };
    coordinator.stop();
    coordinator.join_submission();

    match outcome? {
        SubmissionResult::Verified { identity, derived_status, record } => {
            println!("Verified {identity} ({derived_status})");
            if let Some(record) = record {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Ok(())
        }
        SubmissionResult::Rejected { reason } => Err(format!("Not verified: {reason}").into()),
        SubmissionResult::TransportFailure { cause } => Err(cause.into()),
    }
}

fn run_profile(config: &ScannerConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let directory = build_directory(config)?;
    let profile = directory
        .fetch_profile(id)
        .ok_or_else(|| format!("No profile found for id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ScannerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ScannerConfig::load(path)?),
        None => Ok(ScannerConfig::load_or_default()),
    }
}

fn apply_overrides(
    config: &mut ScannerConfig,
    mode: Option<ScanMode>,
    confidence: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(mode) = mode {
        config.mode = mode;
    }
    if let Some(confidence) = confidence {
        config.detection.confidence = confidence;
    }
    config.validate()?;
    Ok(())
}

fn build_coordinator(
    config: &ScannerConfig,
    source: Box<dyn FrameSource>,
    backend: Backend,
) -> Result<ScanningCoordinator, Box<dyn std::error::Error>> {
    let deps = ScanDependencies {
        source,
        detector: build_detector(config),
        verifier: build_verifier(config, backend)?,
        directory: Arc::new(build_directory(config)?),
    };
    Ok(ScanningCoordinator::new(deps, ScanSettings::from(config)))
}

fn build_detector(config: &ScannerConfig) -> Box<dyn FaceDetector> {
    let mut source = ModelSource::face_model();
    if let Some(dir) = bundled_models_dir() {
        source = source.with_bundled_dir(dir);
    }
    log::info!("Resolving model: {}", source.name);
    let loader = ModelLoader::spawn(source);
    Box::new(
        OnnxFaceDetector::new(loader, config.detection.clone())
            .with_progress(Box::new(download_progress)),
    )
}

fn build_verifier(
    config: &ScannerConfig,
    backend: Backend,
) -> Result<Arc<dyn VerificationClient>, Box<dyn std::error::Error>> {
    let timeout = config.request_timeout();
    let verifier: Arc<dyn VerificationClient> = match backend {
        Backend::Attendance => Arc::new(HttpAttendanceClient::new(
            config.attendance_url.clone(),
            timeout,
        )?),
        Backend::Recognition => Arc::new(HttpVerifyClient::new(&config.recognition_url, timeout)?),
    };
    Ok(verifier)
}

fn build_directory(config: &ScannerConfig) -> Result<HttpDirectoryClient, Box<dyn std::error::Error>> {
    let client = HttpDirectoryClient::new(config.directory_url.clone(), config.request_timeout())?;
    if config.separate_enrollment {
        return Ok(client.with_separate_enrollment(config.recognition_url.clone()));
    }
    Ok(client)
}

fn open_source(input: &InputArgs) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    if let Some(path) = &input.images {
        if !path.exists() {
            return Err(format!("Input not found: {}", path.display()).into());
        }
        return Ok(Box::new(ImageSequenceSource::new(path)));
    }
    camera_source(input.device.as_deref())
}

#[cfg(feature = "ffmpeg")]
fn camera_source(device: Option<&str>) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    Ok(Box::new(FfmpegCameraSource::new(
        device.unwrap_or(DEFAULT_DEVICE),
    )))
}

#[cfg(not(feature = "ffmpeg"))]
fn camera_source(_device: Option<&str>) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    Err("Camera capture needs the ffmpeg feature; use --images instead".into())
}

/// `models/` next to the executable, for pre-packaged installs.
fn bundled_models_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("models"))
}

fn print_event(event: &ScanEvent) {
    match event {
        ScanEvent::StatusChanged(status) => println!("{status}"),
        ScanEvent::LoadingChanged(text) if !text.is_empty() => log::debug!("{text}"),
        ScanEvent::SubmissionCompleted(result) => log::debug!("Submission result: {result:?}"),
        _ => {}
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
