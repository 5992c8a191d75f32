//! `mercora-infra` — Postgres plumbing shared by the domain services.
//!
//! Pool setup, the per-request transaction lifecycle with RLS session
//! binding, the resolver's tenant directory, and the single sqlx → domain
//! error funnel.

pub mod db;
pub mod directory;
pub mod error;
pub mod session;

pub use directory::PgTenantDirectory;
pub use error::{is_unique_violation, map_sqlx_error};
