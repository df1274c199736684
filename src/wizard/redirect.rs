//! Success countdown: returns the wizard home a few seconds after a
//! successful submission.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::WizardStore;

/// Spawn a task that resets the wizard after `delay` if it is still
/// completed by then. Resolves to `true` when it reset the wizard.
pub fn spawn_success_redirect(store: Arc<WizardStore>, delay: Duration) -> JoinHandle<bool> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !store.snapshot().await.is_completed {
            debug!("Success countdown elapsed but wizard already left the success screen");
            return false;
        }
        info!(delay_secs = delay.as_secs(), "Success countdown elapsed, returning home");
        store.go_to_home().await;
        true
    })
}

/// Holds at most one pending success countdown.
pub struct SuccessRedirect {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<bool>>>,
}

impl SuccessRedirect {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Start a fresh countdown, cancelling any earlier one.
    pub async fn arm(&self, store: Arc<WizardStore>) {
        let handle = spawn_success_redirect(store, self.delay);
        if let Some(previous) = self.pending.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the pending countdown, if any.
    pub async fn cancel(&self) {
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
            debug!("Success countdown cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::state::WizardState;
    use crate::wizard::submission::SimulatedSubmission;

    fn completed_store() -> Arc<WizardStore> {
        let mut state = WizardState::default();
        state.complete();
        WizardStore::new(
            state,
            Arc::new(SimulatedSubmission::new(Duration::ZERO)),
            Vec::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_returns_home() {
        let store = completed_store();
        let handle = spawn_success_redirect(Arc::clone(&store), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.snapshot().await.is_completed);

        assert!(handle.await.unwrap());
        assert_eq!(store.snapshot().await, WizardState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_is_noop_after_manual_reset() {
        let store = completed_store();
        let handle = spawn_success_redirect(Arc::clone(&store), Duration::from_secs(5));
        store.go_to_home().await;

        assert!(!handle.await.unwrap());
        assert_eq!(store.snapshot().await, WizardState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_previous_countdown() {
        let store = completed_store();
        let redirect = SuccessRedirect::new(Duration::from_secs(5));

        redirect.arm(Arc::clone(&store)).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        redirect.arm(Arc::clone(&store)).await;

        // The first countdown would have fired at 5s.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(store.snapshot().await.is_completed);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!store.snapshot().await.is_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_keeps_success_state() {
        let store = completed_store();
        let redirect = SuccessRedirect::new(Duration::from_secs(5));
        redirect.arm(Arc::clone(&store)).await;
        redirect.cancel().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.snapshot().await.is_completed);
    }
}
