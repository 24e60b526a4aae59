use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Opens the registros pool and checks the connection with a round trip.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }
}
