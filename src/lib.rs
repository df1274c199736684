//! Signup wizard: multi-step registration flow served over HTTP.

pub mod config;
pub mod error;
pub mod store;
pub mod wizard;
