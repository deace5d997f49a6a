//! Store seams consumed by the search core.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::errors::AppError;
use crate::filters::Predicate;
use crate::models::{AggregateCounts, Lead, SortKey, UsageCounter};

pub use memory::{InMemoryCounterStore, InMemoryLeadStore};
pub use postgres::{PgLeadStore, PgTenantCounterStore};

/// Read access to the lead directory.
///
/// Implementations must evaluate the whole predicate (radius included) inside
/// the store rather than filtering fetched rows.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn count(&self, ctx: &RequestContext, predicate: &Predicate) -> Result<i64, AppError>;

    async fn query(
        &self,
        ctx: &RequestContext,
        predicate: &Predicate,
        sort: SortKey,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Lead>, AppError>;

    async fn aggregate(
        &self,
        ctx: &RequestContext,
        predicate: &Predicate,
    ) -> Result<AggregateCounts, AppError>;
}

/// Mutation applied to a locked counter. Returning an error aborts the transaction.
pub type CounterUpdate = Box<dyn FnOnce(&mut UsageCounter) -> Result<(), AppError> + Send>;

/// Per-tenant usage counters.
#[async_trait]
pub trait TenantCounterStore: Send + Sync {
    /// Runs `update` on the tenant's counter while holding its row lock.
    ///
    /// The counter is read under the lock, `update` mutates it in place, and
    /// the result is written and committed only if `update` returns `Ok`.
    /// Errors, cancellation and timeouts leave the stored row untouched.
    async fn with_tenant_lock(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        update: CounterUpdate,
    ) -> Result<UsageCounter, AppError>;

    /// Unlocked read.
    async fn get(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> Result<Option<UsageCounter>, AppError>;

    /// Creates a zeroed counter. An existing counter is returned unchanged.
    async fn create(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, AppError>;
}
