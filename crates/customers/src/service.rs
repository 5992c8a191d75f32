//! Customer find-or-create with atomic sequence allocation.
//!
//! The row-level update on `tenants.customer_counter` is the concurrency
//! boundary: the database serializes concurrent updates to the same tenant
//! row, so successive values are distinct and the lock span stays at one
//! update plus one read. The increment never runs outside a transaction.

use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use mercora_core::{CustomerCode, DomainError, DomainResult, TenantId};
use mercora_infra::error::map_sqlx_error;
use mercora_infra::session::tx_conn;
use mercora_tenancy::BoundContext;

use crate::customer::{Customer, CustomerProfile, CustomerRow};

#[derive(Clone)]
pub struct CustomerService {
    pool: PgPool,
}

impl CustomerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the customer for (tenant, phone), creating it with a freshly
    /// allocated code when unseen. Repeat phones update name/address in
    /// place and never consume a new code.
    ///
    /// Prefers the request-bound transaction; a call arriving outside the
    /// wrapper gets its own transaction around the whole increment→create
    /// sequence.
    #[instrument(skip(self, profile), fields(tenant_id = tenant_id.as_i64()))]
    pub async fn find_or_create(
        &self,
        tenant_id: TenantId,
        profile: CustomerProfile,
    ) -> DomainResult<Customer> {
        profile.validate()?;

        match BoundContext::current() {
            Some(ctx) => {
                let shared = ctx.tx();
                let mut guard = shared.lock().await;
                let conn = tx_conn(&mut guard)?;
                find_or_create_on(conn, tenant_id, &profile).await
            }
            None => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_sqlx_error("customer_begin", e))?;
                let customer = find_or_create_on(&mut tx, tenant_id, &profile).await?;
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("customer_commit", e))?;
                Ok(customer)
            }
        }
    }

    /// List the tenant's customers by code (merchant surface). Requires the
    /// request-bound transaction; reads are tenant-filtered by row-level
    /// security.
    pub async fn list(&self) -> DomainResult<Vec<Customer>> {
        let ctx = BoundContext::current().ok_or_else(|| {
            DomainError::storage("customer listing invoked outside a request transaction")
        })?;
        let shared = ctx.tx();
        let mut guard = shared.lock().await;
        let conn = tx_conn(&mut guard)?;

        let rows: Vec<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, phone, name, address, code, created_at, updated_at
            FROM customers
            ORDER BY code
            "#,
        )
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error("customer_list", e))?;

        rows.into_iter().map(Customer::try_from).collect()
    }
}

async fn find_or_create_on(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    profile: &CustomerProfile,
) -> DomainResult<Customer> {
    if let Some(existing) = by_phone(conn, tenant_id, &profile.phone).await? {
        return update_profile(conn, &existing, profile).await;
    }

    match allocate(conn, tenant_id, profile).await {
        Ok(customer) => Ok(customer),
        // Counter race re-detected at insert time: another checkout created
        // this phone between our lookup and insert. Return the winning row.
        Err(DomainError::Conflict(_)) => match by_phone(conn, tenant_id, &profile.phone).await? {
            Some(winner) => update_profile(conn, &winner, profile).await,
            None => Err(DomainError::conflict(
                "customer insert conflicted but no row found",
            )),
        },
        Err(other) => Err(other),
    }
}

async fn by_phone(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    phone: &str,
) -> DomainResult<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, phone, name, address, code, created_at, updated_at
        FROM customers
        WHERE tenant_id = $1 AND phone = $2
        "#,
    )
    .bind(tenant_id.as_i64())
    .bind(phone)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("customer_by_phone", e))?;

    row.map(Customer::try_from).transpose()
}

async fn update_profile(
    conn: &mut PgConnection,
    existing: &Customer,
    profile: &CustomerProfile,
) -> DomainResult<Customer> {
    let row: CustomerRow = sqlx::query_as(
        r#"
        UPDATE customers
        SET name = $1, address = $2, updated_at = now()
        WHERE tenant_id = $3 AND id = $4
        RETURNING id, tenant_id, phone, name, address, code, created_at, updated_at
        "#,
    )
    .bind(&profile.name)
    .bind(profile.address.as_deref())
    .bind(existing.tenant_id.as_i64())
    .bind(existing.id.as_i64())
    .fetch_one(conn)
    .await
    .map_err(|e| map_sqlx_error("customer_update_profile", e))?;

    Customer::try_from(row)
}

/// Increment the tenant counter and create the customer with the new value
/// as its code, on one connection inside the ambient transaction.
async fn allocate(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    profile: &CustomerProfile,
) -> DomainResult<Customer> {
    let counter: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE tenants
        SET customer_counter = customer_counter + 1
        WHERE id = $1
        RETURNING customer_counter
        "#,
    )
    .bind(tenant_id.as_i64())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("counter_increment", e))?;

    let Some((counter,)) = counter else {
        return Err(DomainError::NotFound);
    };
    let code = CustomerCode::from_raw(counter)?;

    // The conflict clause turns the phone race into an empty result
    // instead of a 23505, which would abort the request transaction and
    // keep the caller from rereading the winning row.
    let row: Option<CustomerRow> = sqlx::query_as(INSERT_CUSTOMER_SQL)
        .bind(tenant_id.as_i64())
        .bind(&profile.phone)
        .bind(&profile.name)
        .bind(profile.address.as_deref())
        .bind(code.as_i64())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("customer_insert", e))?;

    let Some(row) = row else {
        return Err(DomainError::conflict(
            "customer phone already exists for tenant",
        ));
    };

    tracing::debug!(
        tenant_id = tenant_id.as_i64(),
        code = code.as_i64(),
        "customer code allocated"
    );
    Customer::try_from(row)
}

const INSERT_CUSTOMER_SQL: &str = r#"
    INSERT INTO customers (tenant_id, phone, name, address, code)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (tenant_id, phone) DO NOTHING
    RETURNING id, tenant_id, phone, name, address, code, created_at, updated_at
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_race_is_absorbed_not_raised() {
        // A duplicate phone must come back as an empty result, not 23505;
        // an error here would poison the surrounding request transaction
        // before find_or_create_on rereads the winning row.
        assert!(INSERT_CUSTOMER_SQL.contains("ON CONFLICT (tenant_id, phone) DO NOTHING"));
    }
}
