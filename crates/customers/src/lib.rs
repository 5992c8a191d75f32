//! `mercora-customers` — customer records and the per-tenant sequence
//! allocator.

pub mod customer;
pub mod service;

pub use customer::{Customer, CustomerProfile};
pub use service::CustomerService;
