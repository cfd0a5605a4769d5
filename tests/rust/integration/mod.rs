//! Integration tests - Provider level tests against the in-memory SQL client
//!
//! These tests run the whole pipeline from configuration to features and
//! check the SQL sent to the database.

mod common;
mod feature_stream_tests;
mod mutation_tests;
mod pool_sizing_tests;
