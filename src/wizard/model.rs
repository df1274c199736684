//! Wizard data models: step payloads, accumulated form data, results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which slot of [`FormData`] a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Account,
    Location,
}

impl StepKey {
    /// The step key collected at a 1-based step position, if any.
    pub fn for_step(step: u32) -> Option<Self> {
        match step {
            1 => Some(Self::Account),
            2 => Some(Self::Location),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => write!(f, "account"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// Accepted account credentials.
///
/// The password confirmation is checked by the validator and never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Accepted location details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub country: String,
    #[serde(default)]
    pub state: Option<String>,
    pub city: String,
    pub address: String,
    pub zip_code: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A validated payload for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum StepPayload {
    Account(Account),
    Location(Location),
}

impl StepPayload {
    pub fn key(&self) -> StepKey {
        match self {
            Self::Account(_) => StepKey::Account,
            Self::Location(_) => StepKey::Location,
        }
    }
}

/// Form data accumulated across steps. A slot is filled once its step has
/// been submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl FormData {
    /// Shallow per-field merge of a step payload into its slot.
    ///
    /// Every field of the incoming payload overwrites the stored one; the
    /// optional location fields are overwritten with `None` as well.
    pub fn merge(&mut self, payload: StepPayload) {
        match payload {
            StepPayload::Account(incoming) => match self.account.as_mut() {
                Some(current) => {
                    current.email = incoming.email;
                    current.username = incoming.username;
                    current.password = incoming.password;
                }
                None => self.account = Some(incoming),
            },
            StepPayload::Location(incoming) => match self.location.as_mut() {
                Some(current) => {
                    current.country = incoming.country;
                    current.state = incoming.state;
                    current.city = incoming.city;
                    current.address = incoming.address;
                    current.zip_code = incoming.zip_code;
                    current.timezone = incoming.timezone;
                }
                None => self.location = Some(incoming),
            },
        }
    }
}

/// One entry of the wizard's progress indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
}

impl StepDescriptor {
    pub fn new(id: u32, title: &str, description: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            description: description.to_string(),
            is_completed: false,
        }
    }
}

/// The default step list: account, location, review.
pub fn default_steps() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new(1, "Account Information", "Create your account credentials"),
        StepDescriptor::new(2, "Location Details", "Tell us where you are located"),
        StepDescriptor::new(
            3,
            "Review & Confirm",
            "Review your information before submitting",
        ),
    ]
}

/// Outcome of a final submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FormData>,
}

impl SubmissionResult {
    pub fn succeeded(message: impl Into<String>, data: FormData) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: None,
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: Some(errors),
            data: None,
        }
    }
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// A country or a state/province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
}

impl Region {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// Settings keys used for wizard persistence.
pub mod settings_keys {
    /// Key for the WizardState JSON blob in the settings table.
    pub const WIZARD_STATE: &str = "multistep-form-store";
    /// Default user ID (single-session system).
    pub const DEFAULT_USER: &str = "default";
}
