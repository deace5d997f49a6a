use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub search_cache_ttl: Duration,
    pub preview_cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub usage_reset_days: i64,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10u32)?,
            search_cache_ttl: Duration::from_secs(parse_var("SEARCH_CACHE_TTL_SECS", 300u64)?),
            preview_cache_ttl: Duration::from_secs(parse_var("PREVIEW_CACHE_TTL_SECS", 900u64)?),
            cache_max_capacity: parse_var("CACHE_MAX_CAPACITY", 10_000u64)?,
            usage_reset_days: parse_var("USAGE_RESET_DAYS", 30i64).and_then(|days| {
                if days <= 0 {
                    anyhow::bail!("USAGE_RESET_DAYS must be a positive number of days");
                }
                Ok(days)
            })?,
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 10u64)?),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}...", url_prefix(&config.database_url));
        tracing::debug!(
            "Cache TTLs: search={}s preview={}s, capacity {}",
            config.search_cache_ttl.as_secs(),
            config.preview_cache_ttl.as_secs(),
            config.cache_max_capacity
        );
        tracing::debug!("Usage reset window: {} days", config.usage_reset_days);

        Ok(config)
    }
}

/// First 20 characters of the URL, cut on a character boundary.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}

/// Reads an optional numeric variable, falling back to `default` when unset or blank.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, raw)),
        _ => Ok(default),
    }
}
