use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::model_resolver::{self, ModelResolveError, ModelSource, ResolvedModel};

/// Resolves a model artifact on a background thread.
///
/// Construction starts resolution immediately. Callers block in [`wait`]
/// until it finishes, receiving download progress while they wait.
///
/// [`wait`]: ModelLoader::wait
pub struct ModelLoader {
    source: ModelSource,
    cache_dir: Option<PathBuf>,
    slot: Arc<ModelSlot>,
}

struct ModelSlot {
    result: Mutex<Option<Result<ResolvedModel, String>>>,
    ready: Condvar,
    progress: Arc<Mutex<(u64, u64)>>,
}

impl ModelLoader {
    /// Start resolving `source` against the platform model cache.
    pub fn spawn(source: ModelSource) -> Self {
        Self::start(source, None)
    }

    /// Start resolving `source` against an explicit cache directory.
    pub fn spawn_in(cache_dir: impl Into<PathBuf>, source: ModelSource) -> Self {
        Self::start(source, Some(cache_dir.into()))
    }

    fn start(source: ModelSource, cache_dir: Option<PathBuf>) -> Self {
        let slot = Arc::new(ModelSlot::new());
        let loader = Self {
            source,
            cache_dir,
            slot,
        };

        let slot = loader.slot.clone();
        let source = loader.source.clone();
        let cache_dir = loader.cache_dir.clone();
        thread::spawn(move || {
            let progress = slot.progress.clone();
            let result = resolve(
                cache_dir.as_deref(),
                &source,
                Some(Box::new(move |downloaded, total| {
                    *lock(&progress) = (downloaded, total);
                })),
            );
            slot.finish(result.map_err(|e| e.to_string()));
        });

        loader
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Returns the result if resolution already finished.
    pub fn try_get(&self) -> Option<Result<ResolvedModel, String>> {
        lock(&self.slot.result).clone()
    }

    /// Block until resolution finishes. Calls `on_progress(downloaded, total)`
    /// while a download is running.
    pub fn wait(&self, on_progress: &dyn Fn(u64, u64)) -> Result<ResolvedModel, String> {
        let mut guard = lock(&self.slot.result);
        loop {
            if let Some(ref result) = *guard {
                return result.clone();
            }
            if let Ok(progress) = self.slot.progress.try_lock() {
                let (dl, total) = *progress;
                if total > 0 {
                    on_progress(dl, total);
                }
            }
            let (new_guard, _) = self
                .slot
                .ready
                .wait_timeout(guard, Duration::from_millis(100))
                .unwrap_or_else(|e| e.into_inner());
            guard = new_guard;
        }
    }

    /// Drop a cached artifact that failed to load and fetch it once more.
    ///
    /// Runs synchronously on the calling thread. The stored result is
    /// replaced with the outcome.
    pub fn refetch(&self, stale: &ResolvedModel) -> Result<ResolvedModel, ModelResolveError> {
        model_resolver::evict(stale);
        let result = resolve(self.cache_dir.as_deref(), &self.source, None);
        self.slot.finish(match &result {
            Ok(model) => Ok(model.clone()),
            Err(e) => Err(e.to_string()),
        });
        result
    }
}

impl ModelSlot {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
            progress: Arc::new(Mutex::new((0, 0))),
        }
    }

    fn finish(&self, result: Result<ResolvedModel, String>) {
        *lock(&self.result) = Some(result);
        self.ready.notify_all();
    }
}

fn resolve(
    cache_dir: Option<&std::path::Path>,
    source: &ModelSource,
    progress: Option<model_resolver::ProgressFn>,
) -> Result<ResolvedModel, ModelResolveError> {
    match cache_dir {
        Some(dir) => model_resolver::resolve_in(dir, source, progress),
        None => model_resolver::resolve(source, progress),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
