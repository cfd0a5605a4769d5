//! CQL2 text filters
//!
//! Filters appear in two places: `{filter=..}` flags of source paths, where
//! identifiers are table columns, and user queries, where identifiers are
//! queryable property names. Both are parsed into the same [`Predicate`] AST
//! and encoded to SQL through a [`PropertyResolver`].

pub mod errors;
pub mod expression;
pub mod predicate;

use std::fmt;

pub use errors::FilterError;
pub use expression::{Expr, Literal};
pub use predicate::{ComparisonOp, Predicate};

use crate::dialect::SqlDialect;

/// `column IN (select WHERE [condition AND] ..)`, wraps predicates on joined tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subquery {
    pub column: String,
    pub select: String,
    /// Filters of the joined tables that have no join clause to live in
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperty {
    pub expression: String,
    pub subquery: Option<Subquery>,
}

impl ResolvedProperty {
    pub fn expression(expression: impl Into<String>) -> Self {
        ResolvedProperty {
            expression: expression.into(),
            subquery: None,
        }
    }
}

/// Maps a filter identifier to a SQL expression
pub trait PropertyResolver {
    fn resolve(&self, property: &str) -> Result<ResolvedProperty, FilterError>;
}

/// Identifiers are columns of the table with the given alias
pub struct AliasResolver<'a>(pub &'a str);

impl PropertyResolver for AliasResolver<'_> {
    fn resolve(&self, property: &str) -> Result<ResolvedProperty, FilterError> {
        if self.0.is_empty() {
            Ok(ResolvedProperty::expression(property))
        } else {
            Ok(ResolvedProperty::expression(format!("{}.{}", self.0, property)))
        }
    }
}

pub struct EncodingContext<'a> {
    pub resolver: &'a dyn PropertyResolver,
    pub dialect: &'a dyn SqlDialect,
    pub accenti_collation: Option<&'a str>,
}

impl<'a> EncodingContext<'a> {
    pub fn new(resolver: &'a dyn PropertyResolver, dialect: &'a dyn SqlDialect) -> Self {
        EncodingContext {
            resolver,
            dialect,
            accenti_collation: None,
        }
    }

    pub fn with_collation(mut self, collation: Option<&'a str>) -> Self {
        self.accenti_collation = collation;
        self
    }
}

/// Parsed CQL2 text filter, keeps the original text
#[derive(Debug, Clone, PartialEq)]
pub struct CqlFilter {
    raw: String,
    predicate: Predicate,
}

impl CqlFilter {
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let trimmed = input.trim();
        let (rest, predicate) = predicate::parse_or(trimmed).map_err(|e| FilterError::Parse {
            input: input.to_string(),
            message: e.to_string(),
        })?;

        let rest = rest.trim();
        if !rest.is_empty() {
            return Err(FilterError::TrailingInput {
                rest: rest.to_string(),
            });
        }

        Ok(CqlFilter {
            raw: trimmed.to_string(),
            predicate,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn to_sql(&self, ctx: &EncodingContext<'_>) -> Result<String, FilterError> {
        self.predicate.to_sql(ctx)
    }

    /// Shorthand for filters whose identifiers are columns of `alias`
    pub fn to_sql_with_alias(
        &self,
        alias: &str,
        dialect: &dyn SqlDialect,
    ) -> Result<String, FilterError> {
        self.to_sql(&EncodingContext::new(&AliasResolver(alias), dialect))
    }

    /// Referenced identifiers, deduplicated in order of appearance
    pub fn properties(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for property in self.predicate.properties() {
            if !seen.contains(&property) {
                seen.push(property);
            }
        }
        seen
    }
}

impl fmt::Display for CqlFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
