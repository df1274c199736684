//! `Database` trait: async key/value settings interface for persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Backend-agnostic database trait.
///
/// The wizard only needs a per-user JSON settings table: the full
/// wizard snapshot lives under a single key.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Read a JSON setting, `None` if the key was never written.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Upsert a JSON setting.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;
}
