// ============================================================================
// PostgreSQL Adapters
// ============================================================================
//
// - schema:       idempotent DDL run at startup
// - inbox:        staging store (dedup by message id, claim/lease)
// - orders:       transactional order aggregate repository
// - dead_letters: dead-letter relation
//
// ============================================================================

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

mod dead_letters;
mod inbox;
mod orders;
mod schema;

pub use dead_letters::PgDeadLetters;
pub use inbox::PgInbox;
pub use orders::PgOrdersRepository;
pub use schema::ensure_schema;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
