//! Unit tests - Tests of single components through the public API
//!
//! None of these tests touch a database.

mod config_loading_tests;
mod source_path_tests;
mod template_derivation_tests;
