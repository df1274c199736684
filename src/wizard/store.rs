//! WizardStore: single owner of the wizard state.
//!
//! Every action takes the write lock, mutates, then downgrades to a read
//! lock while observers run, so persistence sees mutations in order and
//! actions never interleave. Subscribers receive [`WizardEvent`]s over a
//! broadcast channel.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use super::model::{Notice, StepPayload, SubmissionResult, settings_keys};
use super::schema::{self, Validated};
use super::state::WizardState;
use super::submission::SubmissionEndpoint;
use crate::error::{self, SubmissionError, WizardError};
use crate::store::Database;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

pub const SUBMIT_ERROR_KEY: &str = "submit";
pub const SUBMIT_ERROR_MESSAGE: &str = "Failed to submit form. Please try again.";
pub const SUBMIT_FAILED_MESSAGE: &str = "Form submission failed.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Events pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    /// Sent after every mutation with the resulting state.
    StateChanged { action: String, state: WizardState },
    /// A transient user-facing notification.
    Notice { notice: Notice },
}

/// Hook invoked after every store mutation.
///
/// Observers run while the store holds a read lock and must not call
/// mutating store actions.
#[async_trait]
pub trait StateObserver: Send + Sync {
    async fn state_changed(&self, action: &str, state: &WizardState);
}

/// Writes the full snapshot to the settings table after every mutation.
pub struct PersistenceObserver {
    db: Arc<dyn Database>,
}

impl PersistenceObserver {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateObserver for PersistenceObserver {
    async fn state_changed(&self, action: &str, state: &WizardState) {
        let value = match serde_json::to_value(state) {
            Ok(v) => v,
            Err(e) => {
                warn!(action, error = %e, "Failed to serialize wizard state");
                return;
            }
        };
        if let Err(e) = self
            .db
            .set_setting(
                settings_keys::DEFAULT_USER,
                settings_keys::WIZARD_STATE,
                &value,
            )
            .await
        {
            warn!(action, error = %e, "Failed to persist wizard state");
        }
    }
}

/// Load the persisted snapshot, falling back to the initial state.
pub async fn load_snapshot(db: &dyn Database) -> WizardState {
    match db
        .get_setting(settings_keys::DEFAULT_USER, settings_keys::WIZARD_STATE)
        .await
    {
        Ok(Some(value)) => match serde_json::from_value::<WizardState>(value) {
            Ok(state) => {
                let state = state.sanitize();
                info!(
                    current_step = state.current_step,
                    finished_step = state.finished_step,
                    completed = state.is_completed,
                    "Restored wizard state"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "Persisted wizard state is unreadable, starting fresh");
                WizardState::default()
            }
        },
        Ok(None) => WizardState::default(),
        Err(e) => {
            warn!(error = %e, "Failed to load wizard state, starting fresh");
            WizardState::default()
        }
    }
}

/// Central state holder for wizard progress.
pub struct WizardStore {
    state: RwLock<WizardState>,
    observers: Vec<Arc<dyn StateObserver>>,
    endpoint: Arc<dyn SubmissionEndpoint>,
    tx: broadcast::Sender<WizardEvent>,
}

impl WizardStore {
    /// Create a store from an initial state.
    pub fn new(
        initial: WizardState,
        endpoint: Arc<dyn SubmissionEndpoint>,
        observers: Vec<Arc<dyn StateObserver>>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(initial),
            observers,
            endpoint,
            tx,
        })
    }

    /// Rehydrate from `db` and persist every later mutation back to it.
    pub async fn restore(
        db: Arc<dyn Database>,
        endpoint: Arc<dyn SubmissionEndpoint>,
    ) -> Arc<Self> {
        let initial = load_snapshot(db.as_ref()).await;
        let persistence: Arc<dyn StateObserver> = Arc::new(PersistenceObserver::new(db));
        Self::new(initial, endpoint, vec![persistence])
    }

    /// Subscribe to state changes and notices.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> WizardState {
        self.state.read().await.clone()
    }

    /// Broadcast a notice to subscribers. Ok if nobody is listening.
    pub fn announce(&self, notice: Notice) {
        let _ = self.tx.send(WizardEvent::Notice { notice });
    }

    async fn notify(&self, action: &str, state: &WizardState) {
        for observer in &self.observers {
            observer.state_changed(action, state).await;
        }
        let _ = self.tx.send(WizardEvent::StateChanged {
            action: action.to_string(),
            state: state.clone(),
        });
    }

    /// Apply `f` under the write lock and notify observers.
    async fn mutate<R>(&self, action: &str, f: impl FnOnce(&mut WizardState) -> R) -> R {
        let mut guard = self.state.write().await;
        let result = f(&mut guard);
        let guard = guard.downgrade();
        debug!(
            action,
            current_step = guard.current_step,
            finished_step = guard.finished_step,
            "Wizard state changed"
        );
        self.notify(action, &guard).await;
        result
    }

    /// Jump to a step without validation (review-screen edits).
    pub async fn set_current_step(&self, step: u32) {
        self.mutate("set_current_step", |state| state.set_current_step(step))
            .await;
    }

    /// Merge `payload` into the current step's slot, mark the step done and
    /// advance. Returns `false`, leaving the state untouched, when the
    /// current step does not collect that payload.
    pub async fn next_step(&self, payload: Option<StepPayload>) -> bool {
        let mut guard = self.state.write().await;
        let step = guard.current_step;
        let key = payload.as_ref().map(|p| p.key());
        if !guard.advance(payload) {
            debug!(step, payload = ?key, "next_step rejected");
            return false;
        }
        let guard = guard.downgrade();
        info!(
            from = step,
            to = guard.current_step,
            finished_step = guard.finished_step,
            "Wizard advanced"
        );
        self.notify("next_step", &guard).await;
        true
    }

    /// Like [`next_step`](Self::next_step) but reports why it refused.
    pub async fn try_next_step(&self, payload: StepPayload) -> Result<(), WizardError> {
        let kind = payload.key();
        if self.next_step(Some(payload)).await {
            Ok(())
        } else {
            let current = self.state.read().await.current_step;
            Err(WizardError::StepMismatch {
                current,
                payload: kind.to_string(),
            })
        }
    }

    /// Validate a step form (`"account"`, `"location"` or `"1"`/`"2"`) and
    /// advance with it. Field errors are recorded in the state on failure
    /// and cleared on success.
    pub async fn submit_step(&self, step: &str, data: &serde_json::Value) -> error::Result<()> {
        let payload = match schema::validate_step(step, data) {
            Ok(Validated::Step(payload)) => payload,
            Ok(Validated::Final { .. }) => {
                return Err(WizardError::InvalidStep(step.to_string()).into());
            }
            Err(errors) => {
                debug!(step, fields = errors.len(), "Step form rejected");
                self.set_errors(errors.fields().clone()).await;
                return Err(errors.into());
            }
        };
        self.try_next_step(payload).await?;
        self.clear_errors().await;
        Ok(())
    }

    pub async fn previous_step(&self) {
        self.mutate("previous_step", |state| state.retreat()).await;
    }

    pub async fn set_submitting(&self, is_submitting: bool) {
        self.mutate("set_submitting", |state| state.is_submitting = is_submitting)
            .await;
    }

    pub async fn set_errors(&self, errors: BTreeMap<String, String>) {
        self.mutate("set_errors", |state| state.errors = errors).await;
    }

    pub async fn clear_errors(&self) {
        self.mutate("clear_errors", |state| state.errors.clear()).await;
    }

    /// Restore the initial state.
    pub async fn reset_form(&self) {
        self.mutate("reset_form", |state| state.reset()).await;
        info!("Wizard reset");
    }

    /// Leave the wizard for the landing screen. Same as [`reset_form`](Self::reset_form).
    pub async fn go_to_home(&self) {
        self.reset_form().await;
    }

    /// Submit the collected data to the endpoint.
    ///
    /// Only one submission runs at a time: while `is_submitting` is set a
    /// second call returns [`WizardError::SubmissionInFlight`] without
    /// contacting the endpoint. The submission runs on its own task so a
    /// dropped caller cannot leave the latch set.
    pub async fn submit_form(self: &Arc<Self>) -> Result<SubmissionResult, WizardError> {
        let store = Arc::clone(self);
        match tokio::spawn(async move { store.run_submission().await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Submission task aborted");
                self.mutate("submit_form", |state| {
                    state.is_submitting = false;
                    state
                        .errors
                        .insert(SUBMIT_ERROR_KEY.to_string(), SUBMIT_ERROR_MESSAGE.to_string());
                })
                .await;
                Err(WizardError::SubmissionAborted(e.to_string()))
            }
        }
    }

    async fn run_submission(&self) -> Result<SubmissionResult, WizardError> {
        let data = {
            let mut guard = self.state.write().await;
            if guard.is_submitting {
                warn!("Submission already in flight, ignoring");
                return Err(WizardError::SubmissionInFlight);
            }

            if let Err(errors) = schema::validate_final(&guard.form_data) {
                warn!(fields = errors.len(), "Final validation failed");
                guard.errors = errors.fields().clone();
                let guard = guard.downgrade();
                self.notify("submit_form", &guard).await;
                return Ok(SubmissionResult::failed(
                    SUBMIT_FAILED_MESSAGE,
                    errors.into_fields(),
                ));
            }

            guard.is_submitting = true;
            let data = guard.form_data.clone();
            let guard = guard.downgrade();
            self.notify("submit_form", &guard).await;
            data
        };

        info!("Submitting registration");
        let outcome = AssertUnwindSafe(self.endpoint.submit(&data))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(SubmissionError::Panicked(panic_message(panic))));

        let result = self
            .mutate("submit_form", |state| {
                state.is_submitting = false;
                match outcome {
                    Ok(response) if response.success => {
                        state.complete();
                        state.errors.clear();
                        SubmissionResult::succeeded(
                            response.message,
                            response.data.unwrap_or(data),
                        )
                    }
                    Ok(response) => {
                        let mut errors = response.errors.unwrap_or_default();
                        errors.insert(SUBMIT_ERROR_KEY.to_string(), SUBMIT_ERROR_MESSAGE.to_string());
                        state.errors = errors.clone();
                        let message = if response.message.is_empty() {
                            SUBMIT_FAILED_MESSAGE.to_string()
                        } else {
                            response.message
                        };
                        SubmissionResult::failed(message, errors)
                    }
                    Err(e) => {
                        error!(error = %e, "Form submission failed");
                        let mut errors = match e {
                            SubmissionError::Rejected { errors, .. } => errors,
                            _ => BTreeMap::new(),
                        };
                        errors.insert(SUBMIT_ERROR_KEY.to_string(), SUBMIT_ERROR_MESSAGE.to_string());
                        state.errors = errors.clone();
                        SubmissionResult::failed(SUBMIT_FAILED_MESSAGE, errors)
                    }
                }
            })
            .await;

        if result.success {
            info!("Registration submitted");
        }
        Ok(result)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        UNEXPECTED_ERROR_MESSAGE.to_string()
    }
}
