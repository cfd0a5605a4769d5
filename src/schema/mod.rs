//! Logical feature schemas and their relational counterpart
//!
//! A [`FeatureSchema`] describes a feature type as configured: nested
//! objects, arrays and values, each mapped to the database with a
//! `sourcePath`. The [`SchemaDeriver`] resolves those paths and produces a
//! tree of [`SchemaSql`] nodes, one per table that has to be read, which
//! drives query generation, decoding and mutations alike.

pub mod deriver;
pub mod errors;
pub mod feature_schema;
pub mod normalize;
pub mod schema_sql;
pub mod scope;

pub use deriver::SchemaDeriver;
pub use errors::SchemaError;
pub use feature_schema::{FeatureSchema, Role, SchemaKind, SchemaType, Scope};
pub use normalize::ConstantNormalizer;
pub use schema_sql::{ColumnSource, ColumnSql, Container, SchemaSql, SortKey};
pub use scope::{apply_scope, value_paths};
