use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::remote::domain::submission::SubmissionResult;
use crate::shared::constants::EVENT_QUEUE_CAPACITY;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Signals the coordinator emits to observers.
#[derive(Clone, Debug)]
pub enum ScanEvent {
    /// Display-ready RGB frame with face outlines drawn in.
    FrameReady { frame: Arc<Frame>, faces: Vec<FaceBox> },
    StatusChanged(String),
    /// Text of the running operation; empty when nothing is running.
    LoadingChanged(String),
    NoFace,
    MultipleFaces(usize),
    /// The padded crop about to be submitted.
    FaceCaptured(Arc<Frame>),
    SubmissionCompleted(SubmissionResult),
}

struct Subscriber {
    tx: Sender<ScanEvent>,
    frames: bool,
}

/// Fan-out of [`ScanEvent`]s to any number of bounded subscriber queues.
///
/// Emitting never blocks. A subscriber whose queue is full misses the event;
/// a subscriber whose receiver was dropped is removed.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event, including frames.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.add(true)
    }

    /// Receives everything except [`ScanEvent::FrameReady`].
    pub fn subscribe_without_frames(&self) -> Receiver<ScanEvent> {
        self.add(false)
    }

    fn add(&self, frames: bool) -> Receiver<ScanEvent> {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        self.lock().push(Subscriber { tx, frames });
        rx
    }

    /// True if anyone would receive a frame event.
    pub fn wants_frames(&self) -> bool {
        self.lock().iter().any(|s| s.frames)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn emit(&self, event: ScanEvent) {
        let is_frame = matches!(event, ScanEvent::FrameReady { .. });
        self.lock().retain(|sub| {
            if is_frame && !sub.frames {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::debug!("Event queue full, dropping event");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
