//! Integration tests for avalanche-ingestion
//!
//! Uses wiremock to simulate the ingestion backend and verifies request
//! shape, acknowledgement handling and failure classification.

mod common;

mod test_classification;
mod test_send;
