use super::{split_extent, BoundingBox, DialectError, JsonValueInfo, SqlDialect};
use crate::config::Dialect;
use crate::schema::SchemaType;

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "tiger", "tiger_data", "topology"];

const SYSTEM_TABLES: &[&str] = &[
    "spatial_ref_sys",
    "geography_columns",
    "geometry_columns",
    "raster_columns",
    "raster_overviews",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlDialectPostGis;

impl SqlDialectPostGis {
    fn cast(value_type: SchemaType) -> &'static str {
        match value_type {
            SchemaType::Float => "::double",
            SchemaType::Integer => "::integer",
            SchemaType::Boolean => "::boolean",
            _ => "::varchar",
        }
    }
}

impl SqlDialect for SqlDialectPostGis {
    fn dialect(&self) -> Dialect {
        Dialect::Pgis
    }

    fn apply_to_wkt(&self, column: &str, force_polygon_ccw: bool, linearize_curves: bool) -> String {
        let mut expression = column.to_string();
        if force_polygon_ccw {
            expression = format!("ST_ForcePolygonCCW({})", expression);
        }
        if linearize_curves {
            expression = format!("ST_CurveToLine({},32,0,1)", expression);
        }
        format!("ST_AsText({})", expression)
    }

    fn apply_to_geometry_input(&self, wkt: &str) -> String {
        format!("ST_GeomFromText('{}')", self.escape_string(wkt))
    }

    fn apply_to_extent(&self, column: &str, is_3d: bool) -> String {
        if is_3d {
            format!("ST_3DExtent({})", column)
        } else {
            format!("ST_Extent({})", column)
        }
    }

    fn parse_extent(&self, extent: &str) -> Option<BoundingBox> {
        let tokens = split_extent(extent);
        let numbers = tokens
            .iter()
            .skip(1)
            .map(|token| token.parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?;

        match numbers.as_slice() {
            [min_x, min_y, min_z, max_x, max_y, max_z, ..] => Some(BoundingBox {
                min_x: *min_x,
                min_y: *min_y,
                min_z: Some(*min_z),
                max_x: *max_x,
                max_y: *max_y,
                max_z: Some(*max_z),
            }),
            [min_x, min_y, max_x, max_y, ..] => {
                Some(BoundingBox::new_2d(*min_x, *min_y, *max_x, *max_y))
            }
            _ => None,
        }
    }

    fn cast_to_big_int(&self, value: i64) -> String {
        format!("{}::bigint", value)
    }

    fn apply_to_string(&self, value: &str) -> String {
        format!("{}::varchar", value)
    }

    fn apply_to_date(&self, column: &str) -> String {
        format!("{}::date", column)
    }

    fn apply_to_datetime(&self, column: &str) -> String {
        format!("{}::timestamp(0)", column)
    }

    fn apply_to_date_literal(&self, date: &str) -> String {
        format!("DATE '{}'", date)
    }

    fn apply_to_datetime_literal(&self, datetime: &str) -> String {
        format!("TIMESTAMP '{}'", datetime)
    }

    fn apply_to_instant_min(&self) -> &'static str {
        "-infinity"
    }

    fn apply_to_instant_max(&self) -> &'static str {
        "infinity"
    }

    // The bounding box is transformed to a CRS that uses meters for all axes
    fn apply_to_diameter(&self, geometry: &str, is_3d: bool) -> Result<String, DialectError> {
        if is_3d {
            Ok(format!(
                "ST_3DLength(ST_BoundingDiagonal(Box3D(ST_Transform(ST_Force3DZ({}),4978))))",
                geometry
            ))
        } else {
            Ok(format!(
                "ST_Length(ST_BoundingDiagonal(Box2D(ST_Transform({},3857))))",
                geometry
            ))
        }
    }

    fn apply_to_json_value(
        &self,
        alias: &str,
        column: &str,
        path: Option<&str>,
        info: &JsonValueInfo,
    ) -> Result<String, DialectError> {
        if info.in_array {
            return Ok(format!(
                "jsonb_path_query_array({}.{}::jsonb,'$.{}')",
                alias,
                column,
                path.unwrap_or_default()
            ));
        }

        let cast = match info.schema_type {
            SchemaType::String | SchemaType::Float | SchemaType::Integer | SchemaType::Boolean => {
                Self::cast(info.schema_type)
            }
            SchemaType::Value | SchemaType::ValueArray => {
                Self::cast(info.value_type.unwrap_or(SchemaType::String))
            }
            _ => "",
        };

        let qualified = if alias.is_empty() {
            column.to_string()
        } else {
            format!("{}.{}", alias, column)
        };

        if info.schema_type == SchemaType::ValueArray {
            return Ok(match path {
                None => format!("{}::jsonb", qualified),
                Some(path) if path.contains('.') => {
                    format!("({} #> '{{{}}}')", qualified, path.replace('.', ","))
                }
                Some(path) => format!("({} -> '{}')", qualified, path),
            });
        }

        Ok(match path {
            None => format!("{}{}", qualified, cast),
            Some(path) if path.contains('.') => {
                format!("({} #>> '{{{}}}'){}", qualified, path.replace('.', ","), cast)
            }
            Some(path) => format!("({} ->> '{}'){}", qualified, path, cast),
        })
    }

    fn system_schemas(&self) -> &'static [&'static str] {
        SYSTEM_SCHEMAS
    }

    fn is_system_table(&self, table: &str) -> bool {
        let name = table.rsplit('.').next().unwrap_or(table);
        SYSTEM_TABLES.contains(&name)
    }
}
