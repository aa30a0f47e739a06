use ort::execution_providers::ExecutionProviderDispatch;

/// Accelerators to try for the face model on this platform.
///
/// Empty on Linux. ort registers CPU as the final fallback on its own, so a
/// missing accelerator never prevents a session from loading.
pub fn accelerated_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
