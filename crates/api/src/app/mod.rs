//! HTTP application wiring (Axum router + service wiring).
//!
//! Layer order matters: authentication must run before the isolation
//! wrapper so an authenticated tenant id is available to the resolver, and
//! the wrapper must enclose every tenant-scoped handler so all of their
//! statements run on the bound transaction.

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use sqlx::PgPool;

use mercora_auth::TrustedJsonValidator;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(pool: PgPool) -> Router {
    let auth_state = middleware::AuthState {
        validator: Arc::new(TrustedJsonValidator),
    };
    let rls_state = middleware::RlsState { pool: pool.clone() };

    let services = Arc::new(services::build_services(pool));

    let scoped = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            rls_state,
            middleware::rls_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
}
