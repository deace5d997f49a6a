//! Lead Search & Metering Core
//!
//! This library provides the lead search core of the lead directory service:
//! filter compilation (including geospatial radius search), result caching,
//! unmetered previews and per-tenant monthly usage metering.
//!
//! # Modules
//!
//! - `cache`: Cache store seam, key derivation and the fault-absorbing gateway.
//! - `config`: Configuration management.
//! - `context`: Per-request deadline and cancellation.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `filters`: Filter compiler (search request -> predicate).
//! - `geo`: Geospatial radius predicate.
//! - `models`: Core data models.
//! - `obs`: Observability and logging.
//! - `search`: Search orchestrator and preview (`LeadSearchService`).
//! - `store`: Lead and usage-counter stores (Postgres and in-memory).
//! - `tasks`: Background task queue for search analytics.
//! - `usage`: Monthly usage meter.

pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod filters;
pub mod geo;
pub mod models;
pub mod obs;
pub mod search;
pub mod store;
pub mod tasks;
pub mod usage;

pub use context::RequestContext;
pub use errors::AppError;
pub use search::{LeadSearchService, SearchDeps, SearchSettings};
