//! featurestore-sql - SQL feature provider
//!
//! Serves features stored in relational databases (PostGIS, GeoPackage)
//! through:
//! - Declarative source paths mapping feature properties to tables and joins
//! - Keyset paged meta and value queries merged into one ordered row stream
//! - Row to feature decoding into nested objects and arrays
//! - Transactional mutations with PATCH semantics and delete triggers

pub mod utils;

pub mod cache;
pub mod config;
pub mod connector;
pub mod decoder;
pub mod dialect;
pub mod filter;
pub mod mutation;
pub mod provider;
pub mod query;
pub mod schema;
pub mod sql_path;

pub use provider::{FeatureProviderSql, FeatureQuery, ProviderError};
