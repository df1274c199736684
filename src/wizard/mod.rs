//! Registration wizard: step progression, validation, guarded navigation
//! and final submission.
//!
//! The store owns the state and is the only writer. Step endpoints validate
//! input with the schema module before handing typed payloads to the store;
//! the guard decides which screens may be entered.

pub mod guard;
pub mod lookup;
pub mod model;
pub mod redirect;
pub mod regions;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod submission;

pub use guard::{GuardDecision, Route};
pub use lookup::{CachedLookup, CountrySelection, RegionLookup, StaticRegionLookup};
pub use model::{Account, FormData, Location, Notice, StepPayload, SubmissionResult};
pub use redirect::SuccessRedirect;
pub use routes::{AppState, wizard_routes};
pub use state::WizardState;
pub use store::{PersistenceObserver, StateObserver, WizardEvent, WizardStore};
pub use submission::{SimulatedSubmission, SubmissionEndpoint};
