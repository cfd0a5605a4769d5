use lazy_static::lazy_static;
use regex::RegexSet;

use super::{split_extent, BoundingBox, DialectError, JsonValueInfo, SqlDialect};
use crate::config::Dialect;
use crate::schema::SchemaType;

lazy_static! {
    static ref SYSTEM_TABLES: RegexSet = RegexSet::new([
        "^gpkg_.*$",
        "^sqlite_.*$",
        "^rtree_.*$",
        "^spatial_ref_sys.*$",
        "^geometry_columns.*$",
        "^geom_cols.*$",
        "^views_geometry_columns.*$",
        "^virts_geometry_columns.*$",
        "^vector_layers.*$",
        "^spatialite_.*$",
        "^sql_statements_log$",
        "^ElementaryGeometries$",
        "^SpatialIndex$",
    ])
    .unwrap_or_else(|_| RegexSet::empty());
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlDialectGpkg;

impl SqlDialectGpkg {
    fn cast(value_type: SchemaType) -> &'static str {
        match value_type {
            SchemaType::Float => "real",
            SchemaType::Integer | SchemaType::Boolean => "integer",
            _ => "text",
        }
    }
}

impl SqlDialect for SqlDialectGpkg {
    fn dialect(&self) -> Dialect {
        Dialect::Gpkg
    }

    fn apply_to_wkt(&self, column: &str, force_polygon_ccw: bool, _linearize_curves: bool) -> String {
        if force_polygon_ccw {
            format!("ST_AsText(ST_ForcePolygonCCW({}))", column)
        } else {
            format!("ST_AsText({})", column)
        }
    }

    fn apply_to_geometry_input(&self, wkt: &str) -> String {
        format!("GeomFromText('{}')", self.escape_string(wkt))
    }

    // Extent() is always a 2D polygon in SpatiaLite
    fn apply_to_extent(&self, column: &str, _is_3d: bool) -> String {
        format!("ST_AsText(Extent({}))", column)
    }

    fn parse_extent(&self, extent: &str) -> Option<BoundingBox> {
        let tokens = split_extent(extent);
        if tokens.len() <= 6 {
            return None;
        }

        let number = |index: usize| tokens[index].parse::<f64>().ok();

        Some(BoundingBox::new_2d(
            number(1)?,
            number(2)?,
            number(5)?,
            number(6)?,
        ))
    }

    fn cast_to_big_int(&self, value: i64) -> String {
        format!("CAST({} AS BIGINT)", value)
    }

    fn apply_to_string(&self, value: &str) -> String {
        format!("cast({} as text)", value)
    }

    fn apply_to_date(&self, column: &str) -> String {
        format!("date({})", column)
    }

    fn apply_to_datetime(&self, column: &str) -> String {
        format!("datetime({})", column)
    }

    fn apply_to_date_literal(&self, date: &str) -> String {
        format!("date('{}')", date)
    }

    fn apply_to_datetime_literal(&self, datetime: &str) -> String {
        format!("datetime('{}')", datetime)
    }

    fn apply_to_instant_min(&self) -> &'static str {
        "0001-01-01T00:00:00Z"
    }

    fn apply_to_instant_max(&self) -> &'static str {
        "9999-12-31T23:59:59Z"
    }

    fn apply_to_diameter(&self, _geometry: &str, _is_3d: bool) -> Result<String, DialectError> {
        Err(DialectError::unsupported(
            "DIAMETER2D()/DIAMETER3D() is not supported for GeoPackage feature providers.",
        ))
    }

    fn apply_to_json_value(
        &self,
        alias: &str,
        column: &str,
        path: Option<&str>,
        info: &JsonValueInfo,
    ) -> Result<String, DialectError> {
        if info.in_array {
            return Err(DialectError::unsupported(
                "Queryables that are values in an array are not supported for GeoPackage feature providers.",
            ));
        }

        let cast = match info.schema_type {
            SchemaType::String | SchemaType::Float | SchemaType::Integer | SchemaType::Boolean => {
                Self::cast(info.schema_type)
            }
            SchemaType::Value => Self::cast(info.value_type.unwrap_or(SchemaType::String)),
            SchemaType::ValueArray | SchemaType::ObjectArray => {
                return Err(DialectError::unsupported(
                    "Arrays as queryables are not supported for GeoPackage feature providers.",
                ));
            }
            _ => "",
        };

        Ok(match (path, cast.is_empty()) {
            (None, true) => format!("{}.{}", alias, column),
            (None, false) => format!("cast({}.{} as {})", alias, column, cast),
            (Some(path), true) => format!("{}.{} ->> '$.{}'", alias, column, path),
            (Some(path), false) => {
                format!("cast(({}.{} ->> '$.{}') as {})", alias, column, path, cast)
            }
        })
    }

    fn system_schemas(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_system_table(&self, table: &str) -> bool {
        SYSTEM_TABLES.is_match(table)
    }
}
