pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Directory name used under the platform cache/config roots.
pub const APP_DIR_NAME: &str = "Attendance Scanner";

/// ~30 polls per second.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 33;
pub const DEFAULT_THROTTLE_WINDOW_MS: u64 = 2000;
pub const DEFAULT_CROP_PADDING: u32 = 50;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MODEL_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_ATTENDANCE_URL: &str = "http://localhost:5207/api/Attendances/recordAttendance";
pub const DEFAULT_DIRECTORY_URL: &str = "http://localhost:5207/api/UserDatas";
pub const DEFAULT_RECOGNITION_URL: &str = "http://127.0.0.1:5000";

/// Per-subscriber event queue depth. Events past this are dropped for that
/// subscriber until it catches up.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Registrants must be at least this old.
pub const MIN_REGISTRANT_AGE_YEARS: u32 = 10;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
