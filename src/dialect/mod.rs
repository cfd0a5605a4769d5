//! SQL dialect adapters
//!
//! Pure translation functions selected once per provider. Nothing in here
//! talks to a database.

pub mod errors;
pub mod gpkg;
pub mod postgis;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub use errors::DialectError;
pub use gpkg::SqlDialectGpkg;
pub use postgis::SqlDialectPostGis;

use crate::config::Dialect;
use crate::schema::SchemaType;

/// Spatial extent returned by [`SqlDialect::parse_extent`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: Option<f64>,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: Option<f64>,
}

impl BoundingBox {
    pub fn new_2d(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            min_z: None,
            max_x,
            max_y,
            max_z: None,
        }
    }
}

/// Temporal extent, `end == None` means open ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Type information for JSON value extraction in queryables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonValueInfo {
    pub schema_type: SchemaType,
    pub value_type: Option<SchemaType>,
    /// The value sits inside an array somewhere up the property path
    pub in_array: bool,
}

pub trait SqlDialect: Send + Sync + std::fmt::Debug {
    fn dialect(&self) -> Dialect;

    fn apply_to_wkt(&self, column: &str, force_polygon_ccw: bool, linearize_curves: bool) -> String;

    /// Geometry literal for mutations from WKT
    fn apply_to_geometry_input(&self, wkt: &str) -> String;

    fn apply_to_extent(&self, column: &str, is_3d: bool) -> String;

    fn parse_extent(&self, extent: &str) -> Option<BoundingBox>;

    fn cast_to_big_int(&self, value: i64) -> String;

    fn apply_to_string(&self, value: &str) -> String;

    fn apply_to_date(&self, column: &str) -> String;

    fn apply_to_datetime(&self, column: &str) -> String;

    fn apply_to_date_literal(&self, date: &str) -> String;

    fn apply_to_datetime_literal(&self, datetime: &str) -> String;

    fn apply_to_instant_min(&self) -> &'static str;

    fn apply_to_instant_max(&self) -> &'static str;

    fn apply_to_diameter(&self, geometry: &str, is_3d: bool) -> Result<String, DialectError>;

    /// Expression extracting `path` from the JSON column `alias.column`
    fn apply_to_json_value(
        &self,
        alias: &str,
        column: &str,
        path: Option<&str>,
        info: &JsonValueInfo,
    ) -> Result<String, DialectError>;

    fn system_schemas(&self) -> &'static [&'static str];

    fn is_system_table(&self, table: &str) -> bool;

    fn apply_to_limit(&self, limit: u64) -> String {
        format!(" LIMIT {}", limit)
    }

    fn apply_to_offset(&self, offset: u64) -> String {
        format!(" OFFSET {}", offset)
    }

    /// Wrap a select that has no `FROM` clause
    fn apply_to_no_table(&self, select: &str) -> String {
        select.to_string()
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn parse_temporal_extent(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<TemporalExtent>, DialectError> {
        let Some(start) = start else {
            return Ok(None);
        };

        let start = parse_instant(start)?;
        let end = end.map(parse_instant).transpose()?;

        Ok(Some(TemporalExtent { start, end }))
    }
}

pub fn for_dialect(dialect: Dialect) -> Arc<dyn SqlDialect> {
    match dialect {
        Dialect::Pgis => Arc::new(SqlDialectPostGis),
        Dialect::Gpkg => Arc::new(SqlDialectGpkg),
    }
}

/// Split an extent like `BOX(1 2,3 4)` into its non empty tokens
pub(crate) fn split_extent(extent: &str) -> Vec<&str> {
    extent
        .split(['(', ')', ',', ' '])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Parse `yyyy-MM-dd[['T'][' ']HH:mm:ss][.SSS][X]` as UTC
pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, DialectError> {
    let value = value.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(instant) = DateTime::parse_from_str(value, format) {
            return Ok(instant.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(instant) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(instant.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|instant| instant.and_utc())
        .ok_or_else(|| DialectError::InvalidTemporal {
            value: value.to_string(),
        })
}
