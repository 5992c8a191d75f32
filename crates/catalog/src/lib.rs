//! `mercora-catalog` — public product listing and availability requests.

pub mod product;
pub mod service;

pub use product::Product;
pub use service::{AvailabilityOutcome, AvailabilityRequest, CatalogService};
