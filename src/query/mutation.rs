//! Mutation statements
//!
//! Statements are rendered one at a time by the mutation executor, since
//! foreign keys of child rows depend on ids returned by earlier inserts.

use serde_json::Value;

use crate::dialect::SqlDialect;
use crate::schema::{ColumnSql, SchemaType};
use crate::sql_path::Junction;

/// SQL literal for a JSON value written into `column`
pub fn literal(column: &ColumnSql, value: &Value, dialect: &dyn SqlDialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => match column.schema_type {
            SchemaType::Geometry => dialect.apply_to_geometry_input(s),
            SchemaType::Date => dialect.apply_to_date_literal(&dialect.escape_string(s)),
            SchemaType::Datetime => dialect.apply_to_datetime_literal(&dialect.escape_string(s)),
            _ => format!("'{}'", dialect.escape_string(s)),
        },
        other => format!("'{}'", dialect.escape_string(&other.to_string())),
    }
}

/// `INSERT INTO t (a,b) VALUES (1,'x') RETURNING id`
pub fn insert(table: &str, values: &[(String, String)], returning: &str) -> String {
    if values.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning);
    }

    let (columns, literals): (Vec<&str>, Vec<&str>) = values
        .iter()
        .map(|(column, literal)| (column.as_str(), literal.as_str()))
        .unzip();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        columns.join(","),
        literals.join(","),
        returning
    )
}

pub fn insert_junction(junction: &Junction, source: &str, target: &str) -> String {
    format!(
        "INSERT INTO {} ({},{}) VALUES ({},{})",
        junction.name, junction.source_field, junction.target_field, source, target
    )
}

/// `UPDATE t SET a=1,b=NULL WHERE key=id`, also used to point a parent row
/// to a newly inserted 1:1 child
pub fn update(table: &str, values: &[(String, String)], key: &str, id: &str) -> String {
    let assignments: Vec<String> = values
        .iter()
        .map(|(column, literal)| format!("{}={}", column, literal))
        .collect();
    format!("UPDATE {} SET {} WHERE {}={}", table, assignments.join(","), key, id)
}

pub fn delete(table: &str, key: &str, id: &str) -> String {
    format!("DELETE FROM {} WHERE {}={} RETURNING {}", table, key, id, key)
}

/// Rows of a child table or junction referencing `value`
pub fn delete_where(table: &str, column: &str, value: &str) -> String {
    format!("DELETE FROM {} WHERE {}={}", table, column, value)
}
