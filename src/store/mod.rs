//! Persistence layer: libSQL-backed settings storage for the wizard snapshot.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
