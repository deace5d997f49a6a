//! In-memory stores for tests and local development.
//!
//! `InMemoryCounterStore` holds one async mutex per tenant, standing in for
//! the row lock the Postgres store takes with `FOR UPDATE`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CounterUpdate, LeadStore, TenantCounterStore};
use crate::context::RequestContext;
use crate::errors::AppError;
use crate::filters::Predicate;
use crate::models::{AggregateCounts, Lead, SortKey, UsageCounter};

#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<Vec<Lead>>,
    count_calls: AtomicU64,
    query_calls: AtomicU64,
    aggregate_calls: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryLeadStore {
    pub fn new(leads: Vec<Lead>) -> Self {
        Self {
            leads: RwLock::new(leads),
            ..Default::default()
        }
    }

    pub async fn insert(&self, lead: Lead) {
        self.leads.write().await.push(lead);
    }

    pub fn count_calls(&self) -> u64 {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn aggregate_calls(&self) -> u64 {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail with a store error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::StoreError("lead store unavailable".to_string()));
        }
        Ok(())
    }
}

fn sort_leads(leads: &mut [&Lead], sort: SortKey) {
    match sort {
        SortKey::Newest => {
            leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
        }
        SortKey::Oldest => {
            leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }
        SortKey::Quality => {
            leads.sort_by(|a, b| b.quality_score.cmp(&a.quality_score).then(a.id.cmp(&b.id)))
        }
        SortKey::Name => leads.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn count(&self, ctx: &RequestContext, predicate: &Predicate) -> Result<i64, AppError> {
        ctx.run(async {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            self.check_failing()?;

            let leads = self.leads.read().await;
            Ok(leads.iter().filter(|l| predicate.matches(l)).count() as i64)
        })
        .await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        predicate: &Predicate,
        sort: SortKey,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Lead>, AppError> {
        ctx.run(async {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            self.check_failing()?;

            let leads = self.leads.read().await;
            let mut matching: Vec<&Lead> = leads.iter().filter(|l| predicate.matches(l)).collect();
            sort_leads(&mut matching, sort);

            Ok(matching
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        })
        .await
    }

    async fn aggregate(
        &self,
        ctx: &RequestContext,
        predicate: &Predicate,
    ) -> Result<AggregateCounts, AppError> {
        ctx.run(async {
            self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
            self.check_failing()?;

            let leads = self.leads.read().await;
            let mut counts = AggregateCounts::default();
            let mut quality_sum = 0i64;

            for lead in leads.iter().filter(|l| predicate.matches(l)) {
                counts.total += 1;
                counts.with_email += i64::from(lead.has_email());
                counts.with_phone += i64::from(lead.has_phone());
                counts.verified += i64::from(lead.is_verified);
                quality_sum += i64::from(lead.quality_score);
            }

            if counts.total > 0 {
                counts.avg_quality = Some(quality_sum as f64 / counts.total as f64);
            }
            Ok(counts)
        })
        .await
    }
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    rows: Mutex<HashMap<Uuid, Arc<Mutex<UsageCounter>>>>,
    commits: AtomicU64,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or overwrites a counter row.
    pub async fn insert(&self, counter: UsageCounter) {
        self.rows
            .lock()
            .await
            .insert(counter.tenant_id, Arc::new(Mutex::new(counter)));
    }

    /// Current committed state of a counter.
    pub async fn snapshot(&self, tenant_id: Uuid) -> Option<UsageCounter> {
        let row = self.rows.lock().await.get(&tenant_id).cloned()?;
        let counter = row.lock().await.clone();
        Some(counter)
    }

    /// Number of transactions that wrote a changed counter.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    async fn row(&self, tenant_id: Uuid) -> Result<Arc<Mutex<UsageCounter>>, AppError> {
        self.rows
            .lock()
            .await
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("usage counter for tenant {}", tenant_id)))
    }
}

#[async_trait]
impl TenantCounterStore for InMemoryCounterStore {
    async fn with_tenant_lock(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        update: CounterUpdate,
    ) -> Result<UsageCounter, AppError> {
        ctx.run(async move {
            let row = self.row(tenant_id).await?;
            let mut locked = row.lock().await;

            let mut counter = locked.clone();
            // Give other tasks a chance to run between read and write, as a
            // network round trip would.
            tokio::task::yield_now().await;

            update(&mut counter)?;

            if counter != *locked {
                *locked = counter.clone();
                self.commits.fetch_add(1, Ordering::SeqCst);
            }
            Ok(counter)
        })
        .await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> Result<Option<UsageCounter>, AppError> {
        ctx.run(async { Ok(self.snapshot(tenant_id).await) }).await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, AppError> {
        ctx.run(async {
            let mut rows = self.rows.lock().await;
            let row = rows
                .entry(tenant_id)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(UsageCounter {
                        tenant_id,
                        consumed: 0,
                        limit,
                        last_reset_at: now,
                    }))
                })
                .clone();
            drop(rows);

            let counter = row.lock().await.clone();
            Ok(counter)
        })
        .await
    }
}
