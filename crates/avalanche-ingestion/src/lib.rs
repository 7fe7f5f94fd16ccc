//! Avalanche Ingestion - Batch transmission to the ingestion backend
//!
//! Implements the `IIngestion` port from `avalanche-core`:
//!
//! - [`client::HttpIngestion`] - JSON-over-HTTP sender with a per-call deadline
//! - [`rate_limit::OutboundBudget`] - request and byte budget shared across channels
//! - [`wire`] - request/response bodies and failure classification

pub mod client;
pub mod rate_limit;
pub mod wire;

pub use client::HttpIngestion;
pub use rate_limit::OutboundBudget;
