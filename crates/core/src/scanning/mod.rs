pub mod events;
pub mod face_policy;
pub mod scan_error;
pub mod scan_loop;
pub mod scanning_coordinator;
pub mod submission_gate;

#[cfg(test)]
pub(crate) mod test_support;
