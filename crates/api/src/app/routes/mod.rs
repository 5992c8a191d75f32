//! HTTP routes, one file per surface.

use axum::Router;

pub mod availability;
pub mod customers;
pub mod orders;
pub mod products;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/availability-requests", availability::router())
        .nest("/orders", orders::router())
        .nest("/customers", customers::router())
}
