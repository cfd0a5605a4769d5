//! Mutation pipeline: incoming feature tokens are encoded into
//! [`FeatureSql`]s, partial updates folded into one patch, and written by
//! the [`MutationExecutor`] one transaction per feature.

pub mod encoder;
pub mod errors;
pub mod executor;
pub mod feature_sql;

pub use encoder::FeatureEncoderSql;
pub use errors::MutationError;
pub use executor::{MutationExecutor, MutationResult, MutationType};
pub use feature_sql::{is_patch_null, reduce_patches, FeatureSql, PATCH_NULL_VALUE};
