// Connection pool for the booking database

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// How long a quote waits for a free connection before the store call fails
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Open a pool of at most `max_connections` to the booking database
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    tracing::debug!("Opening booking database pool ({} connections)", max_connections);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    tracing::info!("Booking database pool ready");
    Ok(pool)
}
