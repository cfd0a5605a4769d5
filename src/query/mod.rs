//! SQL generation
//!
//! Query templates for reading features, statements for mutations and
//! aggregate statistics queries. Table aliases are assigned in join order,
//! the root table is always `A`.

pub mod alias;
pub mod deriver;
pub mod errors;
pub mod join;
pub mod mutation;
pub mod queryables;
pub mod stats;
pub mod templates;

pub use deriver::QueryTemplateDeriver;
pub use errors::QueryError;
pub use queryables::Queryables;
pub use stats::StatsQueries;
pub use templates::{
    ContainerLevel, LevelKind, MetaQueryParams, MetaQueryTemplate, SqlQueryTemplates, TableQuery,
    ValueQueryTemplate,
};
