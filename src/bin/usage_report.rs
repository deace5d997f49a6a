//! Prints the current usage window for one or more tenants.
//!
//! Usage: `usage_report <tenant-uuid> [<tenant-uuid> ...]`

use lead_search_core::config::Config;
use lead_search_core::db::Database;
use lead_search_core::obs;
use lead_search_core::store::PgTenantCounterStore;
use lead_search_core::usage::UsageMeter;
use lead_search_core::RequestContext;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing("lead_search_core=info");

    let tenant_ids = std::env::args()
        .skip(1)
        .map(|arg| {
            Uuid::parse_str(&arg).map_err(|e| anyhow::anyhow!("'{}' is not a tenant id: {}", arg, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if tenant_ids.is_empty() {
        anyhow::bail!("usage: usage_report <tenant-uuid> [<tenant-uuid> ...]");
    }

    let config = Config::from_env()?;
    let db = Database::from_config(&config).await?;
    let meter = UsageMeter::new(
        Arc::new(PgTenantCounterStore::new(db.pool.clone())),
        chrono::Duration::days(config.usage_reset_days),
    );

    println!("{:<38} {:>10} {:>10} {:>10}  resets at", "tenant", "consumed", "limit", "remaining");
    for tenant_id in tenant_ids {
        let ctx = RequestContext::from_config(&config);
        match meter.get_usage_info(&ctx, tenant_id).await {
            Ok(info) => println!(
                "{:<38} {:>10} {:>10} {:>10}  {}",
                tenant_id,
                info.consumed,
                info.limit,
                info.remaining,
                info.reset_at.to_rfc3339()
            ),
            Err(e) => println!("{:<38} error: {}", tenant_id, e),
        }
    }

    Ok(())
}
