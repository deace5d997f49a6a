use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::Config;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::with_max_connections(&config.database_url, config.db_max_connections).await
    }

    async fn with_max_connections(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }
}
