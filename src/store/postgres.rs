use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{CounterUpdate, LeadStore, TenantCounterStore};
use crate::context::RequestContext;
use crate::errors::{AppError, ResultExt};
use crate::filters::{Condition, PresenceField, Predicate};
use crate::models::{AggregateCounts, Lead, SortKey, UsageCounter};

const LEAD_COLUMNS: &str = "id, name, industry, sub_niche, cuisine, sport, tattoo_style, \
     country, city, address, postal_code, phone, email, website, social_media, \
     latitude, longitude, is_verified, quality_score, created_at";

const COUNTER_COLUMNS: &str = "tenant_id, consumed, usage_limit, last_reset_at";

/// Lead store over the `leads` table.
///
/// Radius conditions compile to `ST_DWithin` on the `location` geography
/// column, which is served by its GiST index.
#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends ` WHERE ... AND ...` for every condition in `predicate`.
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
    for (i, condition) in predicate.conditions().iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });

        match condition {
            Condition::Equals { field, value } => {
                qb.push(field.column()).push(" = ").push_bind(value.clone());
            }
            Condition::Present(PresenceField::SocialMedia) => {
                qb.push(
                    "(jsonb_typeof(social_media) = 'object' AND social_media <> '{}'::jsonb)",
                );
            }
            Condition::Present(field) => {
                let column = match field {
                    PresenceField::Email => "email",
                    PresenceField::Phone => "phone",
                    _ => "website",
                };
                qb.push("(")
                    .push(column)
                    .push(" IS NOT NULL AND ")
                    .push(column)
                    .push(" <> '')");
            }
            Condition::Verified => {
                qb.push("is_verified");
            }
            Condition::WithinRadius(radius) => {
                // Leads without a location never match.
                qb.push("(location IS NOT NULL AND ST_DWithin(location, ST_SetSRID(ST_MakePoint(")
                    .push_bind(radius.longitude)
                    .push(", ")
                    .push_bind(radius.latitude)
                    .push("), 4326)::geography, ")
                    .push_bind(radius.radius_meters)
                    .push("))");
            }
        }
    }
}

fn order_clause(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Newest => " ORDER BY created_at DESC, id DESC",
        SortKey::Oldest => " ORDER BY created_at ASC, id ASC",
        SortKey::Quality => " ORDER BY quality_score DESC, id ASC",
        SortKey::Name => " ORDER BY name ASC, id ASC",
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn count(&self, ctx: &RequestContext, predicate: &Predicate) -> Result<i64, AppError> {
        ctx.run(async {
            let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads");
            push_predicate(&mut qb, predicate);

            let total: i64 = qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .context("count leads")?;
            Ok(total)
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
            let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
            qb.push(LEAD_COLUMNS).push(" FROM leads");
            push_predicate(&mut qb, predicate);
            qb.push(order_clause(sort))
                .push(" LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind(offset);

            let leads: Vec<Lead> = qb
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .context("query leads page")?;
            Ok(leads)
        })
        .await
    }

    async fn aggregate(
        &self,
        ctx: &RequestContext,
        predicate: &Predicate,
    ) -> Result<AggregateCounts, AppError> {
        ctx.run(async {
            let mut qb = QueryBuilder::<Postgres>::new(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE email IS NOT NULL AND email <> '') AS with_email,
                       COUNT(*) FILTER (WHERE phone IS NOT NULL AND phone <> '') AS with_phone,
                       COUNT(*) FILTER (WHERE is_verified) AS verified,
                       AVG(quality_score)::float8 AS avg_quality
                FROM leads
                "#,
            );
            push_predicate(&mut qb, predicate);

            let counts: AggregateCounts = qb
                .build_query_as()
                .fetch_one(&self.pool)
                .await
                .context("aggregate leads")?;
            Ok(counts)
        })
        .await
    }
}

/// Usage counters in `tenant_usage`, one row per tenant.
#[derive(Clone)]
pub struct PgTenantCounterStore {
    pool: PgPool,
}

impl PgTenantCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantCounterStore for PgTenantCounterStore {
    async fn with_tenant_lock(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        update: CounterUpdate,
    ) -> Result<UsageCounter, AppError> {
        // Dropping `tx` on cancellation or an early return rolls it back.
        ctx.run(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("begin usage transaction")?;

            // FOR UPDATE serializes concurrent increments for this tenant.
            let mut counter = sqlx::query_as::<_, UsageCounter>(&format!(
                "SELECT {} FROM tenant_usage WHERE tenant_id = $1 FOR UPDATE",
                COUNTER_COLUMNS
            ))
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await
            .context("lock usage counter")?
            .ok_or_else(|| {
                AppError::NotFound(format!("usage counter for tenant {}", tenant_id))
            })?;

            let before = counter.clone();
            if let Err(e) = update(&mut counter) {
                tx.rollback()
                    .await
                    .context("roll back usage transaction")?;
                return Err(e);
            }

            if counter != before {
                sqlx::query(
                    r#"
                    UPDATE tenant_usage
                    SET consumed = $2,
                        last_reset_at = $3,
                        updated_at = now()
                    WHERE tenant_id = $1
                    "#,
                )
                .bind(tenant_id)
                .bind(counter.consumed)
                .bind(counter.last_reset_at)
                .execute(&mut *tx)
                .await
                .context("update usage counter")?;
            }

            tx.commit().await.context("commit usage transaction")?;
            Ok(counter)
        })
        .await
    }

    async fn get(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
    ) -> Result<Option<UsageCounter>, AppError> {
        ctx.run(async {
            sqlx::query_as::<_, UsageCounter>(&format!(
                "SELECT {} FROM tenant_usage WHERE tenant_id = $1",
                COUNTER_COLUMNS
            ))
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .context("read usage counter")
        })
        .await
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        tenant_id: Uuid,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, AppError> {
        ctx.run(async {
            sqlx::query(
                r#"
                INSERT INTO tenant_usage (tenant_id, consumed, usage_limit, last_reset_at)
                VALUES ($1, 0, $2, $3)
                ON CONFLICT (tenant_id) DO NOTHING
                "#,
            )
            .bind(tenant_id)
            .bind(limit)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("create usage counter")?;

            sqlx::query_as::<_, UsageCounter>(&format!(
                "SELECT {} FROM tenant_usage WHERE tenant_id = $1",
                COUNTER_COLUMNS
            ))
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .context("read created usage counter")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::compile_filters;
    use crate::models::SearchFilter;

    fn where_clause(filter: SearchFilter) -> String {
        let compiled = compile_filters(&filter);
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads");
        push_predicate(&mut qb, &compiled.predicate);
        qb.sql().to_string()
    }

    #[test]
    fn empty_predicate_has_no_where() {
        assert_eq!(
            where_clause(SearchFilter::default()),
            "SELECT COUNT(*) FROM leads"
        );
    }

    #[test]
    fn equality_values_are_bound_not_inlined() {
        let sql = where_clause(SearchFilter {
            industry: Some("gym'; DROP TABLE leads; --".into()),
            city: Some("Lisbon".into()),
            ..Default::default()
        });

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM leads WHERE industry = $1 AND city = $2"
        );
    }

    #[test]
    fn radius_is_pushed_down_as_st_dwithin() {
        let sql = where_clause(SearchFilter {
            latitude: Some(38.72),
            longitude: Some(-9.14),
            radius: Some(5.0),
            has_email: true,
            ..Default::default()
        });

        assert!(sql.contains("(email IS NOT NULL AND email <> '')"));
        assert!(sql.contains(
            "ST_DWithin(location, ST_SetSRID(ST_MakePoint($1, $2), 4326)::geography, $3)"
        ));
    }
}
