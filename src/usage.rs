//! Per-tenant monthly usage metering.
//!
//! `check_and_increment` runs reset, check and increment on a counter held
//! under the store's row lock, so concurrent calls for one tenant are
//! serialized across replicas. Calls for different tenants never contend.
//!
//! No retries happen here. An increment is not idempotent, so retrying after
//! an ambiguous failure (e.g. a timeout during commit) is the caller's call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::errors::AppError;
use crate::models::{UsageCounter, UsageInfo};
use crate::store::TenantCounterStore;

pub const DEFAULT_RESET_WINDOW_DAYS: i64 = 30;

#[derive(Clone)]
pub struct UsageMeter {
    counters: Arc<dyn TenantCounterStore>,
    reset_window: Duration,
}

impl UsageMeter {
    pub fn new(counters: Arc<dyn TenantCounterStore>, reset_window: Duration) -> Self {
        Self {
            counters,
            reset_window,
        }
    }

    /// Charges `amount` against the tenant's quota.
    ///
    /// Returns the committed counter, or `QuotaExceeded` with nothing persisted.
    pub async fn check_and_increment(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        amount: u32,
    ) -> Result<UsageCounter, AppError> {
        let window = self.reset_window;
        let amount = i64::from(amount);

        let result = self
            .counters
            .with_tenant_lock(
                ctx,
                tenant_id,
                // `now` is read under the lock.
                Box::new(move |counter: &mut UsageCounter| {
                    apply_increment(counter, amount, Utc::now(), window)
                }),
            )
            .await;

        match &result {
            Ok(counter) => tracing::debug!(
                "Tenant {} usage now {}/{}",
                tenant_id,
                counter.consumed,
                counter.limit
            ),
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!("Tenant {} quota rejected: {}", tenant_id, e)
            }
            Err(e) => tracing::error!("Usage increment failed for tenant {}: {}", tenant_id, e),
        }

        result
    }

    /// Informational view of the tenant's quota. Reads without locking.
    pub async fn get_usage_info(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> Result<UsageInfo, AppError> {
        let counter = self
            .counters
            .get(ctx, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("usage counter for tenant {}", tenant_id)))?;

        Ok(usage_info(&counter, Utc::now(), self.reset_window))
    }

    /// Creates the tenant's counter if it does not exist yet.
    pub async fn provision(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<UsageCounter, AppError> {
        if limit <= 0 {
            return Err(AppError::BadRequest(format!(
                "usage limit must be positive, got {}",
                limit
            )));
        }

        let counter = self.counters.create(ctx, tenant_id, limit, Utc::now()).await?;
        tracing::info!(
            "Usage counter ready for tenant {} (limit {})",
            tenant_id,
            counter.limit
        );
        Ok(counter)
    }
}

fn window_elapsed(counter: &UsageCounter, now: DateTime<Utc>, window: Duration) -> bool {
    now - counter.last_reset_at > window
}

/// Reset-then-check-then-increment on a locked counter.
///
/// On `QuotaExceeded` the counter may already carry the reset; the store
/// discards it together with the rest of the aborted transaction.
pub fn apply_increment(
    counter: &mut UsageCounter,
    amount: i64,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<(), AppError> {
    if window_elapsed(counter, now, window) {
        counter.consumed = 0;
        counter.last_reset_at = now;
    }

    if counter.consumed + amount > counter.limit {
        return Err(AppError::QuotaExceeded {
            consumed: counter.consumed,
            limit: counter.limit,
        });
    }

    counter.consumed += amount;
    Ok(())
}

/// Builds the informational view, accounting for a window that has lapsed
/// but not yet been reset by an increment.
pub fn usage_info(counter: &UsageCounter, now: DateTime<Utc>, window: Duration) -> UsageInfo {
    let (consumed, reset_at) = if window_elapsed(counter, now, window) {
        (0, now + window)
    } else {
        (counter.consumed, counter.last_reset_at + window)
    };

    UsageInfo {
        consumed,
        limit: counter.limit,
        remaining: (counter.limit - consumed).max(0),
        reset_at,
    }
}
