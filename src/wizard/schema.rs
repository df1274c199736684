//! Per-step schema validation.
//!
//! Every rule of a step is checked independently and all violations are
//! reported together, first message per field. Validation never touches
//! wizard state.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{Account, FormData, Location, StepPayload};
use super::regions;
use crate::error::ValidationErrors;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9_'+\-.]*[A-Z0-9_+\-]@([A-Z0-9][A-Z0-9\-]*\.)+[A-Z]{2,}$")
        .expect("email pattern is valid")
});

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("username pattern is valid"));

static ZIP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("zip pattern is valid"));

pub const INVALID_STATE_MESSAGE: &str = "Please select a valid state/province";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords don't match";

/// Step identifiers understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStep {
    Account,
    Location,
    Final,
}

impl SchemaStep {
    /// Parse `"1"`, `"2"`, `"3"` or `"final"` (also the key names).
    pub fn parse(step: &str) -> Option<Self> {
        match step.trim() {
            "1" | "account" => Some(Self::Account),
            "2" | "location" => Some(Self::Location),
            "3" | "final" => Some(Self::Final),
            _ => None,
        }
    }
}

/// Candidate account input, including the password confirmation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountForm {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

/// Candidate location input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocationForm {
    pub country: String,
    pub state: Option<String>,
    pub city: String,
    pub address: String,
    pub zip_code: String,
    pub timezone: Option<String>,
}

/// A payload accepted by [`validate_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    Step(StepPayload),
    Final { account: Account, location: Location },
}

fn check_email(email: &str, errors: &mut ValidationErrors) {
    if email.is_empty() {
        errors.add("email", "Email is required");
    }
    let well_formed =
        !email.starts_with('.') && !email.contains("..") && EMAIL_PATTERN.is_match(email);
    if !well_formed {
        errors.add("email", "Please enter a valid email address");
    }
}

fn check_username(username: &str, errors: &mut ValidationErrors) {
    let len = username.chars().count();
    if len < 3 {
        errors.add("username", "Username must be at least 3 characters");
    }
    if len > 20 {
        errors.add("username", "Username must be less than 20 characters");
    }
    if !USERNAME_PATTERN.is_match(username) {
        errors.add(
            "username",
            "Username can only contain letters, numbers, and underscores",
        );
    }
}

fn check_password(password: &str, errors: &mut ValidationErrors) {
    if password.chars().count() < 8 {
        errors.add("password", "Password must be at least 8 characters");
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        errors.add(
            "password",
            "Password must contain at least one uppercase letter, one lowercase letter, and one number",
        );
    }
}

/// Validate the account step.
pub fn validate_account(form: &AccountForm) -> Result<Account, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    check_email(&form.email, &mut errors);
    check_username(&form.username, &mut errors);
    check_password(&form.password, &mut errors);

    if form.confirm_password.is_empty() {
        errors.add("confirmPassword", "Please confirm your password");
    } else if form.confirm_password != form.password {
        errors.add("confirmPassword", PASSWORD_MISMATCH_MESSAGE);
    }

    errors.into_result(Account {
        email: form.email.clone(),
        username: form.username.clone(),
        password: form.password.clone(),
    })
}

/// Re-check a stored account (the confirmation is gone by then).
fn revalidate_account(account: &Account) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_email(&account.email, &mut errors);
    check_username(&account.username, &mut errors);
    check_password(&account.password, &mut errors);
    errors.into_result(())
}

/// Validate the location step.
pub fn validate_location(form: &LocationForm) -> Result<Location, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if form.address.chars().count() < 5 {
        errors.add("address", "Address must be at least 5 characters");
    }

    if form.zip_code.is_empty() {
        errors.add("zipCode", "ZIP code is required");
    }
    if !ZIP_PATTERN.is_match(&form.zip_code) {
        errors.add("zipCode", "Please enter a valid ZIP code");
    }

    if form.country.is_empty() {
        errors.add("country", "Country is required");
    }

    if form.city.is_empty() {
        errors.add("city", "City is required");
    }

    if regions::requires_state(&form.country) {
        let valid = form
            .state
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .is_some_and(|s| regions::is_known_state(&form.country, s));
        if !valid {
            errors.add("state", INVALID_STATE_MESSAGE);
        }
    }

    errors.into_result(Location {
        country: form.country.clone(),
        state: form.state.clone(),
        city: form.city.clone(),
        address: form.address.clone(),
        zip_code: form.zip_code.clone(),
        timezone: form.timezone.clone(),
    })
}

fn location_form(location: &Location) -> LocationForm {
    LocationForm {
        country: location.country.clone(),
        state: location.state.clone(),
        city: location.city.clone(),
        address: location.address.clone(),
        zip_code: location.zip_code.clone(),
        timezone: location.timezone.clone(),
    }
}

/// Pre-submit check: both sections present and independently valid.
///
/// Error keys are prefixed with the section name (`account.email`).
pub fn validate_final(data: &FormData) -> Result<(Account, Location), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    match &data.account {
        Some(account) => {
            if let Err(e) = revalidate_account(account) {
                errors.extend_prefixed("account", e);
            }
        }
        None => errors.add("account", "Account information is required"),
    }

    match &data.location {
        Some(location) => {
            if let Err(e) = validate_location(&location_form(location)) {
                errors.extend_prefixed("location", e);
            }
        }
        None => errors.add("location", "Location information is required"),
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    match (&data.account, &data.location) {
        (Some(account), Some(location)) => Ok((account.clone(), location.clone())),
        _ => Err(errors),
    }
}

fn parse_form<T: serde::de::DeserializeOwned>(data: &serde_json::Value) -> Result<T, ValidationErrors> {
    serde_json::from_value(data.clone()).map_err(|e| {
        let mut errors = ValidationErrors::new();
        errors.add("form", format!("Invalid form data: {e}"));
        errors
    })
}

/// Validate candidate JSON for a step identifier (`"1"`, `"2"`, `"final"`).
pub fn validate_step(step: &str, data: &serde_json::Value) -> Result<Validated, ValidationErrors> {
    match SchemaStep::parse(step) {
        Some(SchemaStep::Account) => {
            let form: AccountForm = parse_form(data)?;
            validate_account(&form).map(|a| Validated::Step(StepPayload::Account(a)))
        }
        Some(SchemaStep::Location) => {
            let form: LocationForm = parse_form(data)?;
            validate_location(&form).map(|l| Validated::Step(StepPayload::Location(l)))
        }
        Some(SchemaStep::Final) => {
            let account: AccountForm = parse_form(&data["account"])
                .map_err(|_| missing_section("account"))?;
            let location: LocationForm = parse_form(&data["location"])
                .map_err(|_| missing_section("location"))?;

            let mut errors = ValidationErrors::new();
            let account = validate_account(&account)
                .map_err(|e| errors.extend_prefixed("account", e))
                .ok();
            let location = validate_location(&location)
                .map_err(|e| errors.extend_prefixed("location", e))
                .ok();
            match (account, location) {
                (Some(account), Some(location)) if errors.is_empty() => {
                    Ok(Validated::Final { account, location })
                }
                _ => Err(errors),
            }
        }
        None => {
            let mut errors = ValidationErrors::new();
            errors.add("step", "Invalid step");
            Err(errors)
        }
    }
}

fn missing_section(section: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let label = match section {
        "account" => "Account",
        _ => "Location",
    };
    errors.add(section, format!("{label} information is required"));
    errors
}
