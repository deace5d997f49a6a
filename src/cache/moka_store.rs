use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use super::CacheStore;
use crate::errors::AppError;

#[derive(Clone)]
struct StoredValue {
    payload: String,
    ttl: Duration,
}

/// Each entry expires after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`CacheStore`] backed by moka. Each replica keeps its own copy.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, StoredValue>,
}

impl MokaCacheStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.cache.get(key).await.map(|v| v.payload))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        self.cache
            .insert(
                key.to_string(),
                StoredValue {
                    payload: value,
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, AppError> {
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &doomed {
            self.cache.invalidate(key).await;
        }

        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MokaCacheStore::new(100);
        store
            .set("leads:search:a", "page".into(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("leads:search:a").await.unwrap(),
            Some("page".to_string())
        );
        assert_eq!(store.get("leads:search:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let store = MokaCacheStore::new(100);
        store
            .set("short", "x".into(), Duration::from_millis(50))
            .await
            .unwrap();
        store
            .set("long", "y".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some("y".to_string()));
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let store = MokaCacheStore::new(100);
        let ttl = Duration::from_secs(60);
        store.set("leads:search:1", "a".into(), ttl).await.unwrap();
        store.set("leads:preview:1", "b".into(), ttl).await.unwrap();
        store.set("other:1", "c".into(), ttl).await.unwrap();

        let removed = store.delete_prefix("leads:").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.get("leads:search:1").await.unwrap(), None);
        assert_eq!(store.get("leads:preview:1").await.unwrap(), None);
        assert_eq!(store.get("other:1").await.unwrap(), Some("c".to_string()));
    }
}
