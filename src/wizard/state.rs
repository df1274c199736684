//! Wizard state machine: tracks the current step, completion, and the
//! data collected so far.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::{FormData, StepDescriptor, StepKey, StepPayload, default_steps};

/// Persisted wizard state.
///
/// Stored in the `settings` table under key `"multistep-form-store"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    /// Active step, 1-based, never above `steps.len()`.
    pub current_step: u32,
    /// Highest step ever completed. Only a reset lowers it.
    pub finished_step: u32,
    /// Terminal flag set by a successful submission.
    pub is_completed: bool,
    #[serde(default)]
    pub form_data: FormData,
    pub steps: Vec<StepDescriptor>,
    #[serde(default)]
    pub is_submitting: bool,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: 1,
            finished_step: 0,
            is_completed: false,
            form_data: FormData::default(),
            steps: default_steps(),
            is_submitting: false,
            errors: BTreeMap::new(),
        }
    }
}

impl WizardState {
    /// Number of steps (N).
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Highest step the user may enter.
    pub fn furthest_allowed_step(&self) -> u32 {
        (self.finished_step + 1).min(self.step_count())
    }

    /// Jump to a step without any checks beyond keeping it in `[1, N]`.
    pub fn set_current_step(&mut self, step: u32) {
        self.current_step = step.clamp(1, self.step_count().max(1));
    }

    /// Commit the current step and move forward.
    ///
    /// With a payload, the current step must collect that payload's key
    /// (1 → account, 2 → location); otherwise nothing changes and `false`
    /// is returned.
    pub fn advance(&mut self, payload: Option<StepPayload>) -> bool {
        let step = self.current_step;

        if let Some(payload) = payload {
            match StepKey::for_step(step) {
                Some(key) if key == payload.key() => self.form_data.merge(payload),
                _ => return false,
            }
        }

        if let Some(descriptor) = self.steps.iter_mut().find(|s| s.id == step) {
            descriptor.is_completed = true;
        }
        self.finished_step = self.finished_step.max(step);
        if step < self.step_count() {
            self.current_step = step + 1;
        }
        true
    }

    /// Move back one step, never below 1.
    pub fn retreat(&mut self) {
        if self.current_step > 1 {
            self.current_step -= 1;
        }
    }

    /// Mark the wizard as submitted.
    pub fn complete(&mut self) {
        self.is_completed = true;
        self.finished_step = self.step_count();
    }

    /// Restore every field to its initial value.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Repair a snapshot loaded from storage.
    ///
    /// A submission cannot survive a restart, so the latch is released;
    /// the step pointer is clamped in case the step list changed.
    pub fn sanitize(mut self) -> Self {
        if self.steps.is_empty() {
            self.steps = default_steps();
        }
        self.is_submitting = false;
        self.current_step = self.current_step.clamp(1, self.step_count());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::model::{Account, Location};

    fn account() -> Account {
        Account {
            email: "jane@example.com".to_string(),
            username: "jane_doe".to_string(),
            password: "Secret123".to_string(),
        }
    }

    fn location() -> Location {
        Location {
            country: "DE".to_string(),
            state: None,
            city: "Berlin".to_string(),
            address: "Unter den Linden 1".to_string(),
            zip_code: "10117".to_string(),
            timezone: Some("Europe/Berlin".to_string()),
        }
    }

    #[test]
    fn default_state() {
        let state = WizardState::default();
        assert_eq!(state.current_step, 1);
        assert_eq!(state.finished_step, 0);
        assert!(!state.is_completed);
        assert!(!state.is_submitting);
        assert!(state.errors.is_empty());
        assert_eq!(state.form_data, FormData::default());
        assert_eq!(state.step_count(), 3);
        assert_eq!(state.steps[0].title, "Account Information");
    }

    #[test]
    fn advance_from_first_step_with_account() {
        let mut state = WizardState::default();
        assert!(state.advance(Some(StepPayload::Account(account()))));

        assert_eq!(state.current_step, 2);
        assert_eq!(state.finished_step, 1);
        assert!(state.steps[0].is_completed);
        assert!(!state.steps[1].is_completed);
        assert_eq!(state.form_data.account, Some(account()));
        assert!(state.form_data.location.is_none());
    }

    #[test]
    fn advance_walks_all_steps_and_caps() {
        let mut state = WizardState::default();
        assert!(state.advance(Some(StepPayload::Account(account()))));
        assert!(state.advance(Some(StepPayload::Location(location()))));
        assert_eq!(state.current_step, 3);
        assert_eq!(state.finished_step, 2);

        // Review step has no payload slot but can still be marked done.
        assert!(state.advance(None));
        assert_eq!(state.current_step, 3);
        assert_eq!(state.finished_step, 3);
        assert!(state.steps.iter().all(|s| s.is_completed));

        for _ in 0..5 {
            state.advance(None);
            assert!(state.current_step <= state.step_count());
        }
    }

    #[test]
    fn payload_on_review_step_is_rejected_without_mutation() {
        let mut state = WizardState::default();
        state.set_current_step(3);
        let before = state.clone();
        assert!(!state.advance(Some(StepPayload::Account(account()))));
        assert_eq!(state, before);
    }

    #[test]
    fn mismatched_payload_is_rejected_without_mutation() {
        let mut state = WizardState::default();
        let before = state.clone();
        assert!(!state.advance(Some(StepPayload::Location(location()))));
        assert_eq!(state, before);
    }

    #[test]
    fn finished_step_never_decreases_on_advance() {
        let mut state = WizardState::default();
        state.advance(Some(StepPayload::Account(account())));
        state.advance(Some(StepPayload::Location(location())));
        assert_eq!(state.finished_step, 2);

        // Edit jump back to step 1 and re-submit twice.
        state.set_current_step(1);
        state.advance(Some(StepPayload::Account(account())));
        assert_eq!(state.finished_step, 2);
        state.set_current_step(1);
        state.advance(Some(StepPayload::Account(account())));
        assert_eq!(state.finished_step, 2);
        assert_eq!(state.current_step, 2);
    }

    #[test]
    fn retreat_floors_at_one() {
        let mut state = WizardState::default();
        state.retreat();
        assert_eq!(state.current_step, 1);
        state.set_current_step(3);
        state.retreat();
        assert_eq!(state.current_step, 2);
    }

    #[test]
    fn set_current_step_is_clamped() {
        let mut state = WizardState::default();
        state.set_current_step(0);
        assert_eq!(state.current_step, 1);
        state.set_current_step(99);
        assert_eq!(state.current_step, 3);
        state.set_current_step(2);
        assert_eq!(state.current_step, 2);
        // No validation: jumping ahead does not touch completion.
        assert_eq!(state.finished_step, 0);
    }

    #[test]
    fn complete_and_reset() {
        let mut state = WizardState::default();
        state.advance(Some(StepPayload::Account(account())));
        state.complete();
        assert!(state.is_completed);
        assert_eq!(state.finished_step, 3);

        state.errors.insert("submit".into(), "x".into());
        state.reset();
        assert_eq!(state, WizardState::default());
    }

    #[test]
    fn furthest_allowed_step() {
        let mut state = WizardState::default();
        assert_eq!(state.furthest_allowed_step(), 1);
        state.advance(Some(StepPayload::Account(account())));
        assert_eq!(state.furthest_allowed_step(), 2);
        state.complete();
        assert_eq!(state.furthest_allowed_step(), 3);
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = WizardState::default();
        state.advance(Some(StepPayload::Account(account())));
        state.advance(Some(StepPayload::Location(location())));
        state.errors.insert("city".into(), "City is required".into());

        let json = serde_json::to_string(&state).unwrap();
        let parsed: WizardState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn serialized_field_names() {
        let json = serde_json::to_value(WizardState::default()).unwrap();
        assert_eq!(json["currentStep"], 1);
        assert_eq!(json["finishedStep"], 0);
        assert_eq!(json["isCompleted"], false);
        assert_eq!(json["isSubmitting"], false);
        assert_eq!(json["steps"][0]["isCompleted"], false);
        assert_eq!(json["formData"], serde_json::json!({}));
    }

    #[test]
    fn sanitize_releases_stale_latch() {
        let mut state = WizardState::default();
        state.is_submitting = true;
        state.current_step = 7;
        let repaired = state.sanitize();
        assert!(!repaired.is_submitting);
        assert_eq!(repaired.current_step, 3);
    }
}
