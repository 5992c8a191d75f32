//! Public catalog reads and availability requests.
//!
//! Everything here runs on the request-bound transaction, so product reads
//! are already tenant-filtered by row-level security; queries never carry
//! an explicit tenant predicate beyond the inserted `tenant_id` column.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use tracing::instrument;

use mercora_core::{DomainError, DomainResult, ProductId, TenantId};
use mercora_infra::error::map_sqlx_error;
use mercora_infra::session::tx_conn;
use mercora_tenancy::BoundContext;

use crate::product::{Product, ProductRow};

/// A visitor's request to be told when an unavailable product returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRequest {
    pub id: i64,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub visitor_id: String,
    pub requested_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Outcome of recording an availability request. A repeat request from the
/// same visitor for the same product on the same day is not an error; the
/// unique index detects it and the original row is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityOutcome {
    Created(AvailabilityRequest),
    AlreadyRequestedToday(AvailabilityRequest),
}

impl AvailabilityOutcome {
    pub fn request(&self) -> &AvailabilityRequest {
        match self {
            Self::Created(r) | Self::AlreadyRequestedToday(r) => r,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }

    /// List the tenant's available products (public storefront).
    pub async fn list_available(&self) -> DomainResult<Vec<Product>> {
        let ctx = bound_context()?;
        let shared = ctx.tx();
        let mut guard = shared.lock().await;
        let conn = tx_conn(&mut guard)?;

        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, unit_price, available, created_at
            FROM products
            WHERE available
            ORDER BY name, id
            "#,
        )
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("product_list", e))?;

        rows.into_iter().map(Product::try_from).collect()
    }

    pub async fn get_product(&self, product_id: ProductId) -> DomainResult<Product> {
        let ctx = bound_context()?;
        let shared = ctx.tx();
        let mut guard = shared.lock().await;
        let conn = tx_conn(&mut guard)?;

        product_by_id(conn, product_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    /// Record that a visitor wants `product_id` back in stock. Same visitor,
    /// same product, same day collapses onto the existing row.
    #[instrument(skip(self, visitor_id), fields(tenant_id = tenant_id.as_i64()))]
    pub async fn request_availability(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        visitor_id: &str,
    ) -> DomainResult<AvailabilityOutcome> {
        if visitor_id.trim().is_empty() {
            return Err(DomainError::validation("visitor_id must not be empty"));
        }

        let ctx = bound_context()?;
        let shared = ctx.tx();
        let mut guard = shared.lock().await;
        let conn = tx_conn(&mut guard)?;

        // The product must exist and belong to this tenant; RLS hides
        // foreign rows so this also covers cross-tenant probing.
        if product_by_id(conn, product_id).await?.is_none() {
            return Err(DomainError::NotFound);
        }

        // The conflict clause absorbs a same-day duplicate instead of
        // raising 23505, which would abort the request transaction and
        // make the reread below impossible.
        let inserted: Option<RequestRow> = sqlx::query_as(INSERT_REQUEST_SQL)
            .bind(tenant_id.as_i64())
            .bind(product_id.as_i64())
            .bind(visitor_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("availability_insert", e))?;

        match inserted {
            Some(row) => Ok(AvailabilityOutcome::Created(row.try_into()?)),
            None => {
                let row: RequestRow = sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, product_id, visitor_id, requested_on, created_at
                    FROM availability_requests
                    WHERE product_id = $1 AND visitor_id = $2
                      AND requested_on = CURRENT_DATE
                    "#,
                )
                .bind(product_id.as_i64())
                .bind(visitor_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("availability_reread", e))?;
                Ok(AvailabilityOutcome::AlreadyRequestedToday(row.try_into()?))
            }
        }
    }
}

const INSERT_REQUEST_SQL: &str = r#"
    INSERT INTO availability_requests (tenant_id, product_id, visitor_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (tenant_id, product_id, visitor_id, requested_on) DO NOTHING
    RETURNING id, tenant_id, product_id, visitor_id, requested_on, created_at
"#;

fn bound_context() -> DomainResult<BoundContext> {
    BoundContext::current().ok_or_else(|| {
        DomainError::storage("catalog operation invoked outside a request transaction")
    })
}

async fn product_by_id(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> DomainResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, name, unit_price, available, created_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(product_id.as_i64())
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("product_by_id", e))?;

    row.map(Product::try_from).transpose()
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: i64,
    tenant_id: i64,
    product_id: i64,
    visitor_id: String,
    requested_on: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for AvailabilityRequest {
    type Error = DomainError;

    fn try_from(row: RequestRow) -> DomainResult<AvailabilityRequest> {
        Ok(AvailabilityRequest {
            id: row.id,
            tenant_id: TenantId::from_raw(row.tenant_id)?,
            product_id: ProductId::from_raw(row.product_id)?,
            visitor_id: row.visitor_id,
            requested_on: row.requested_on,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exposes_the_row_either_way() {
        let req = AvailabilityRequest {
            id: 1,
            tenant_id: TenantId::from_raw(1).unwrap(),
            product_id: ProductId::from_raw(2).unwrap(),
            visitor_id: "v-1".into(),
            requested_on: NaiveDate::from_ymd_opt(2026, 8, 25).unwrap(),
            created_at: Utc::now(),
        };
        assert_eq!(AvailabilityOutcome::Created(req.clone()).request(), &req);
        assert_eq!(
            AvailabilityOutcome::AlreadyRequestedToday(req.clone()).request(),
            &req
        );
    }

    #[test]
    fn same_day_duplicate_is_absorbed_not_raised() {
        // The insert must resolve the duplicate in-statement; an error at
        // this point would poison the surrounding request transaction.
        assert!(INSERT_REQUEST_SQL.contains(
            "ON CONFLICT (tenant_id, product_id, visitor_id, requested_on) DO NOTHING"
        ));
    }

    #[tokio::test]
    async fn catalog_outside_a_request_is_a_storage_error() {
        let err = CatalogService::new().list_available().await.unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
