//! Search orchestrator and preview.
//!
//! The only entry point the HTTP layer and ingestion jobs call. Searches go
//! cache -> (miss) compile -> lead store -> cache. Previews take the same
//! path over aggregate counts and never touch the usage meter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::{keys, CacheGateway, CacheStore, MokaCacheStore};
use crate::config::Config;
use crate::context::RequestContext;
use crate::errors::AppError;
use crate::filters::{canonicalize, compile_filters, Predicate};
use crate::models::{Pagination, PreviewStats, ResultPage, SearchFilter, UsageInfo};
use crate::store::{LeadStore, PgLeadStore, PgTenantCounterStore, TenantCounterStore};
use crate::tasks::{BackgroundTask, PgSearchEventRecorder, SearchEvent, SpawningTaskQueue, TaskQueue};
use crate::usage::{UsageMeter, DEFAULT_RESET_WINDOW_DAYS};

/// Cache lifetimes and the usage reset window.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub search_ttl: Duration,
    pub preview_ttl: Duration,
    pub usage_window: chrono::Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            search_ttl: Duration::from_secs(5 * 60),
            preview_ttl: Duration::from_secs(15 * 60),
            usage_window: chrono::Duration::days(DEFAULT_RESET_WINDOW_DAYS),
        }
    }
}

impl From<&Config> for SearchSettings {
    fn from(config: &Config) -> Self {
        Self {
            search_ttl: config.search_cache_ttl,
            preview_ttl: config.preview_cache_ttl,
            usage_window: chrono::Duration::days(config.usage_reset_days),
        }
    }
}

/// Collaborators injected into [`LeadSearchService`].
pub struct SearchDeps {
    pub leads: Arc<dyn LeadStore>,
    pub counters: Arc<dyn TenantCounterStore>,
    pub cache: Arc<dyn CacheStore>,
    pub tasks: Arc<dyn TaskQueue>,
}

#[derive(Clone)]
pub struct LeadSearchService {
    leads: Arc<dyn LeadStore>,
    cache: CacheGateway,
    meter: UsageMeter,
    tasks: Arc<dyn TaskQueue>,
    settings: SearchSettings,
}

impl LeadSearchService {
    pub fn new(deps: SearchDeps, settings: SearchSettings) -> Self {
        Self {
            leads: deps.leads,
            cache: CacheGateway::new(deps.cache),
            meter: UsageMeter::new(deps.counters, settings.usage_window),
            tasks: deps.tasks,
            settings,
        }
    }

    /// Wires Postgres stores, a moka cache and the Postgres analytics recorder.
    pub fn from_pool(pool: sqlx::PgPool, config: &Config) -> Self {
        let deps = SearchDeps {
            leads: Arc::new(PgLeadStore::new(pool.clone())),
            counters: Arc::new(PgTenantCounterStore::new(pool.clone())),
            cache: Arc::new(MokaCacheStore::new(config.cache_max_capacity)),
            tasks: Arc::new(SpawningTaskQueue::new(Arc::new(PgSearchEventRecorder::new(
                pool,
            )))),
        };
        tracing::info!("Lead search service initialized");
        Self::new(deps, SearchSettings::from(config))
    }

    /// Returns one page of leads matching `filter`. Not metered.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        filter: &SearchFilter,
    ) -> Result<ResultPage, AppError> {
        let (page, key, cache_hit) = self.search_inner(ctx, filter).await?;
        self.record_search(None, &key, &page, cache_hit);
        Ok(page)
    }

    /// Searches, then charges the tenant one unit per lead returned.
    ///
    /// When the charge is rejected the page is withheld, no search event is
    /// recorded and `QuotaExceeded` is returned. Empty pages are free.
    pub async fn search_for_tenant(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        filter: &SearchFilter,
    ) -> Result<ResultPage, AppError> {
        let (page, key, cache_hit) = self.search_inner(ctx, filter).await?;

        let returned = u32::try_from(page.data.len())
            .map_err(|_| AppError::InternalError("page larger than u32::MAX".to_string()))?;
        if returned > 0 {
            self.meter
                .check_and_increment(ctx, tenant_id, returned)
                .await?;
        }

        self.record_search(Some(tenant_id), &key, &page, cache_hit);
        Ok(page)
    }

    /// Returns the page, its cache key and whether it came from the cache.
    async fn search_inner(
        &self,
        ctx: &RequestContext,
        filter: &SearchFilter,
    ) -> Result<(ResultPage, String, bool), AppError> {
        let compiled = compile_filters(filter);
        let key = keys::search_key(&compiled.applied);

        if let Some(page) = self.cache.get_json::<ResultPage>(ctx, &key).await {
            return Ok((page, key, true));
        }

        let total = self
            .leads
            .count(ctx, &compiled.predicate)
            .await
            .map_err(log_store_fault)?;

        // Past the last page there is nothing to fetch.
        let data = if compiled.offset < total {
            self.leads
                .query(
                    ctx,
                    &compiled.predicate,
                    compiled.sort,
                    compiled.limit,
                    compiled.offset,
                )
                .await
                .map_err(log_store_fault)?
        } else {
            Vec::new()
        };

        let page = ResultPage {
            data,
            pagination: Pagination::new(compiled.applied.page, compiled.applied.limit, total),
            filters: compiled.applied,
        };

        self.cache
            .set_json(ctx, &key, &page, self.settings.search_ttl)
            .await;

        Ok((page, key, false))
    }

    /// Aggregate statistics over `filter`. Never charges quota.
    pub async fn preview(
        &self,
        ctx: &RequestContext,
        filter: &SearchFilter,
    ) -> Result<PreviewStats, AppError> {
        let applied = canonicalize(filter);
        let key = keys::preview_key(&applied);

        if let Some(stats) = self.cache.get_json::<PreviewStats>(ctx, &key).await {
            return Ok(stats);
        }

        let predicate = Predicate::from_applied(&applied);
        let counts = self
            .leads
            .aggregate(ctx, &predicate)
            .await
            .map_err(log_store_fault)?;
        let stats = PreviewStats::from_counts(&counts);

        self.cache
            .set_json(ctx, &key, &stats, self.settings.preview_ttl)
            .await;

        Ok(stats)
    }

    /// Charges `amount` against the tenant's monthly quota.
    pub async fn check_and_increment_usage(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        amount: u32,
    ) -> Result<(), AppError> {
        self.meter
            .check_and_increment(ctx, tenant_id, amount)
            .await
            .map(|_| ())
    }

    pub async fn get_usage_info(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> Result<UsageInfo, AppError> {
        self.meter.get_usage_info(ctx, tenant_id).await
    }

    /// Creates the tenant's usage counter at account creation.
    pub async fn provision_tenant(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<(), AppError> {
        self.meter.provision(ctx, tenant_id, limit).await.map(|_| ())
    }

    /// Drops every cached search page and preview.
    ///
    /// Called by ingestion after bulk changes to the lead set.
    pub async fn invalidate_cache(&self, ctx: &RequestContext) -> Result<u64, AppError> {
        self.cache
            .invalidate_prefix(ctx, keys::LEADS_NAMESPACE)
            .await
    }

    fn record_search(&self, tenant_id: Option<Uuid>, key: &str, page: &ResultPage, cache_hit: bool) {
        self.tasks
            .submit(BackgroundTask::RecordSearch(SearchEvent {
                tenant_id,
                cache_key: key.to_string(),
                total: page.pagination.total,
                returned: page.data.len(),
                cache_hit,
                occurred_at: Utc::now(),
            }));
    }
}

fn log_store_fault(e: AppError) -> AppError {
    if !e.is_cancellation() {
        tracing::error!("Lead store failure: {}", e);
    }
    e
}
