//! sqlx → domain error mapping.
//!
//! One funnel for every query in the workspace, so the error-code policy
//! lives in a single place:
//!
//! | sqlx error | Postgres code | DomainError | Scenario |
//! |------------|---------------|-------------|----------|
//! | Database   | `23505`       | `Conflict`  | unique-constraint race (counter, token, same-day request) |
//! | Database   | other codes   | `Storage`   | constraint/engine failures |
//! | RowNotFound| n/a           | `NotFound`  | `fetch_one` against an absent row |
//! | PoolClosed | n/a           | `Storage`   | shutdown race |
//! | other      | n/a           | `Storage`   | network, protocol, decode |

use mercora_core::DomainError;

pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(msg),
                _ => DomainError::storage(msg),
            }
        }
        sqlx::Error::RowNotFound => DomainError::NotFound,
        sqlx::Error::PoolClosed => {
            DomainError::storage(format!("connection pool closed in {operation}"))
        }
        other => DomainError::storage(format!("{operation}: {other}")),
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert_eq!(
            map_sqlx_error("load_order", sqlx::Error::RowNotFound),
            DomainError::NotFound
        );
    }

    #[test]
    fn pool_closed_maps_to_storage() {
        let err = map_sqlx_error("load_order", sqlx::Error::PoolClosed);
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
