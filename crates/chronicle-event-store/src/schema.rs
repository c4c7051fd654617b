//! Event store database schema.

use sqlx::PgPool;
use sqlx::migrate::Migrator;

use chronicle_core::error::DomainError;

/// Migrations creating the `event_streams` and `stream_events` tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies any pending event store migrations.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DomainError::Infrastructure(format!("event store migration failed: {e}")))
}
