use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

/// Completions hold a transaction open across a few statements; keep headroom
/// for concurrent confirmations.
const MAX_CONNECTIONS: u32 = 10;

pub async fn init_db(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|e| {
            anyhow::anyhow!("Postgres connection failed (check DATABASE_URL/password): {e}")
        })?;

    info!("Connected to database!");
    Ok(pool)
}
