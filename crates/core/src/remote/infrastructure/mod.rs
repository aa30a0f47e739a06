pub mod http_attendance_client;
pub mod http_directory_client;
pub mod http_support;
pub mod http_verify_client;
