pub mod client_error;
pub mod directory_client;
pub mod profile;
pub mod scan_mode;
pub mod submission;
pub mod verification_client;
pub mod verify_response;
