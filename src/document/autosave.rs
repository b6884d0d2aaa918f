use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Single-slot trailing-edge debounce timer.
///
/// Arming cancels any pending timer before scheduling the new one, so at
/// most one save is outstanding per field group at any time. The slot does
/// not queue: a burst of edits collapses into the single action scheduled
/// last.
pub(crate) struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending: None,
        }
    }

    /// Cancel any pending timer and run `action` after the delay.
    pub fn arm<F, Fut>(&mut self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
        }));
    }

    /// Drop the pending timer without firing it.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
