//! Route guard: decides whether a requested screen may be entered.

use serde::Serialize;

use super::model::Notice;
use super::state::WizardState;

/// Shown once when the user tries to skip ahead.
pub const SKIP_AHEAD_WARNING: &str = "Please complete the previous steps first.";

/// Path of the success screen.
pub const SUCCESS_PATH: &str = "/step4";

/// A wizard screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    /// 1-based wizard step.
    Step(u32),
    Success,
}

impl Route {
    /// Map a screen number to a route: 0 is home, `1..=N` are steps and
    /// `N + 1` is the success screen.
    pub fn from_number(number: u32, step_count: u32) -> Option<Self> {
        match number {
            0 => Some(Self::Home),
            n if n <= step_count => Some(Self::Step(n)),
            n if n == step_count + 1 => Some(Self::Success),
            _ => None,
        }
    }

    /// Parse `/` or `/stepK`.
    pub fn parse(path: &str, step_count: u32) -> Option<Self> {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Some(Self::Home);
        }
        let number = path.strip_prefix("/step")?.parse::<u32>().ok()?;
        if number == 0 {
            return None;
        }
        Self::from_number(number, step_count)
    }

    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Step(k) => format!("/step{k}"),
            Self::Success => SUCCESS_PATH.to_string(),
        }
    }
}

impl Serialize for Route {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path())
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    Redirect {
        to: Route,
        #[serde(skip_serializing_if = "Option::is_none")]
        notice: Option<Notice>,
    },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether `route` may be entered in `state`.
pub fn evaluate(route: Route, state: &WizardState) -> GuardDecision {
    match route {
        Route::Home => GuardDecision::Allow,
        Route::Step(k) => check_step(k, state).unwrap_or(GuardDecision::Allow),
        Route::Success => {
            if let Some(redirect) = check_step(state.step_count() + 1, state) {
                return redirect;
            }
            if state.is_completed {
                GuardDecision::Allow
            } else {
                GuardDecision::Redirect {
                    to: Route::Home,
                    notice: None,
                }
            }
        }
    }
}

/// Steps up to `finishedStep + 1` are open.
fn check_step(k: u32, state: &WizardState) -> Option<GuardDecision> {
    if k <= state.finished_step + 1 {
        return None;
    }
    Some(GuardDecision::Redirect {
        to: Route::Step(state.furthest_allowed_step()),
        notice: Some(Notice::warning(SKIP_AHEAD_WARNING)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::model::NoticeLevel;

    fn state_with(finished_step: u32, is_completed: bool) -> WizardState {
        WizardState {
            finished_step,
            is_completed,
            ..WizardState::default()
        }
    }

    #[test]
    fn home_is_always_allowed() {
        for finished in 0..=3 {
            assert!(evaluate(Route::Home, &state_with(finished, false)).is_allowed());
        }
    }

    #[test]
    fn fresh_state_only_opens_first_step() {
        let state = WizardState::default();
        assert!(evaluate(Route::Step(1), &state).is_allowed());

        let decision = evaluate(Route::Step(3), &state);
        assert_eq!(
            decision,
            GuardDecision::Redirect {
                to: Route::Step(1),
                notice: Some(Notice::warning(SKIP_AHEAD_WARNING)),
            }
        );
    }

    #[test]
    fn step_rule_holds_for_every_progress_level() {
        for finished in 0..=3u32 {
            let state = state_with(finished, false);
            for k in 1..=3u32 {
                let decision = evaluate(Route::Step(k), &state);
                if k <= finished + 1 {
                    assert!(decision.is_allowed(), "k={k} finished={finished}");
                } else {
                    match decision {
                        GuardDecision::Redirect { to, notice } => {
                            assert_eq!(to, Route::Step((finished + 1).min(3)));
                            let notice = notice.expect("skip-ahead carries a notice");
                            assert_eq!(notice.level, NoticeLevel::Warning);
                            assert_eq!(notice.message, SKIP_AHEAD_WARNING);
                        }
                        GuardDecision::Allow => panic!("k={k} finished={finished} allowed"),
                    }
                }
            }
        }
    }

    #[test]
    fn success_requires_all_steps_first() {
        let decision = evaluate(Route::Success, &state_with(1, false));
        assert_eq!(
            decision,
            GuardDecision::Redirect {
                to: Route::Step(2),
                notice: Some(Notice::warning(SKIP_AHEAD_WARNING)),
            }
        );
    }

    #[test]
    fn success_without_submission_goes_home_quietly() {
        let decision = evaluate(Route::Success, &state_with(3, false));
        assert_eq!(
            decision,
            GuardDecision::Redirect {
                to: Route::Home,
                notice: None,
            }
        );
    }

    #[test]
    fn success_after_submission_is_allowed() {
        let mut state = WizardState::default();
        state.complete();
        assert!(evaluate(Route::Success, &state).is_allowed());
    }

    #[test]
    fn parse_paths() {
        assert_eq!(Route::parse("/", 3), Some(Route::Home));
        assert_eq!(Route::parse("", 3), Some(Route::Home));
        assert_eq!(Route::parse("/step2", 3), Some(Route::Step(2)));
        assert_eq!(Route::parse("/step3/", 3), Some(Route::Step(3)));
        assert_eq!(Route::parse("/step4", 3), Some(Route::Success));
        assert_eq!(Route::parse("/step0", 3), None);
        assert_eq!(Route::parse("/step5", 3), None);
        assert_eq!(Route::parse("/review", 3), None);
    }

    #[test]
    fn from_number_covers_home_steps_and_success() {
        assert_eq!(Route::from_number(0, 3), Some(Route::Home));
        assert_eq!(Route::from_number(3, 3), Some(Route::Step(3)));
        assert_eq!(Route::from_number(4, 3), Some(Route::Success));
        assert_eq!(Route::from_number(5, 3), None);
    }

    #[test]
    fn decision_serializes_with_paths() {
        let json = serde_json::to_value(evaluate(Route::Step(2), &WizardState::default())).unwrap();
        assert_eq!(json["decision"], "redirect");
        assert_eq!(json["to"], "/step1");
        assert_eq!(json["notice"]["level"], "warning");

        let json = serde_json::to_value(GuardDecision::Allow).unwrap();
        assert_eq!(json, serde_json::json!({"decision": "allow"}));
    }
}
