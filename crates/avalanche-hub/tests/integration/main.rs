//! Integration tests for the Avalanche facade

mod common;
mod test_identity;
mod test_lifecycle;
