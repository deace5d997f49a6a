//! Cache store seam and the fault-absorbing gateway in front of it.
//!
//! The cache is an accelerator only. Read failures are misses, write failures
//! are logged and dropped, and nothing here can fail a search or preview.
//!
//! Concurrent misses on the same key each recompute and each write back
//! (no request coalescing), so expiry of a hot key can stampede the lead store.

pub mod envelope;
pub mod keys;
pub mod moka_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::context::RequestContext;
use crate::errors::AppError;
use envelope::CacheEnvelope;

pub use moka_store::MokaCacheStore;

/// Key-value store with per-entry TTL and prefix deletion.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;

    /// Deletes every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Looks up and decodes a cached value. Any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, ctx: &RequestContext, key: &str) -> Option<T> {
        let stored = match ctx.run(self.store.get(key)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!("Cache MISS: {}", key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Cache read failed for {}, treating as miss: {}", key, e);
                return None;
            }
        };

        let payload = CacheEnvelope::open(&stored)?;
        match serde_json::from_str(&payload) {
            Ok(value) => {
                tracing::debug!("Cache HIT: {}", key);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Cached value for {} did not decode, treating as miss: {}", key, e);
                None
            }
        }
    }

    /// Best-effort write. Failures are logged, never returned.
    pub async fn set_json<T: Serialize>(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
        ttl: Duration,
    ) {
        let sealed = serde_json::to_string(value)
            .and_then(|payload| CacheEnvelope::new(payload).seal());
        let sealed = match sealed {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::warn!("Skipping cache write for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = ctx.run(self.store.set(key, sealed, ttl)).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Sweeps every key under `prefix`. A failed sweep is returned to the caller.
    pub async fn invalidate_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<u64, AppError> {
        let removed = ctx.run(self.store.delete_prefix(prefix)).await?;
        tracing::info!("Invalidated {} cache entries under '{}'", removed, prefix);
        Ok(removed)
    }
}
