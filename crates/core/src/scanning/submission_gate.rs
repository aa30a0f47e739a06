use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Why a submission could not start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateRefusal {
    /// Another submission is still in flight.
    Busy,
    /// The previous attempt started less than one window ago.
    Throttled { remaining: Duration },
}

#[derive(Debug, Default)]
struct GateState {
    processing: bool,
    last_attempt: Option<Instant>,
}

/// Single point of truth for "is a submission in flight" and "when did the
/// last one start".
///
/// Both are checked and claimed under one lock, so two callers can never
/// both get a permit. The throttle clock advances only when a throttled
/// permit is granted.
#[derive(Debug)]
pub struct SubmissionGate {
    window: Duration,
    state: Mutex<GateState>,
}

/// Proof of an in-flight submission. Dropping it, including during a
/// panic, marks the gate idle again.
#[derive(Debug)]
pub struct SubmissionPermit {
    gate: Arc<SubmissionGate>,
}

impl SubmissionGate {
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            state: Mutex::new(GateState::default()),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claims the gate for an attempt starting at `now`.
    pub fn try_begin(self: &Arc<Self>, now: Instant) -> Result<SubmissionPermit, GateRefusal> {
        let mut state = self.lock();
        if state.processing {
            return Err(GateRefusal::Busy);
        }
        if let Some(last) = state.last_attempt {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.window {
                return Err(GateRefusal::Throttled {
                    remaining: self.window - elapsed,
                });
            }
        }
        state.processing = true;
        state.last_attempt = Some(now);
        Ok(SubmissionPermit { gate: self.clone() })
    }

    /// Claims the gate ignoring the throttle window, and without moving
    /// the throttle clock. Used for operator-initiated one-shot work.
    pub fn try_begin_unthrottled(self: &Arc<Self>) -> Result<SubmissionPermit, GateRefusal> {
        let mut state = self.lock();
        if state.processing {
            return Err(GateRefusal::Busy);
        }
        state.processing = true;
        Ok(SubmissionPermit { gate: self.clone() })
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.lock().last_attempt
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.gate.lock().processing = false;
    }
}
