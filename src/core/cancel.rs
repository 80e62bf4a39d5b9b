use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flags tracking how an outbound stream ended.
///
/// The relay marks the handle completed once it has written a terminal
/// event; the disconnect wrapper cancels it when the response body is
/// dropped. A cancel after completion is a normal end, not a disconnect.
#[derive(Clone, Debug, Default)]
pub struct StreamCancelHandle {
    completed: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the stream as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Check if the stream completed normally
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation. Returns true if this call observed a
    /// disconnect, i.e. the stream had not completed and was not
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        if self.is_completed() {
            return false;
        }
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
