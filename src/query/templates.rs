//! Meta and value query templates
//!
//! Templates are derived once per feature type. The meta query returns the
//! sort key window of a chunk together with its counts, the value queries
//! read one table node each, restricted to that window.

use std::sync::Arc;

use crate::connector::SqlValue;
use crate::dialect::SqlDialect;
use crate::schema::{ColumnSql, Container, SchemaType, SortKey};

const SKEY: &str = "SKEY";
const TAB: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Object,
    Array,
}

/// One nesting level the rows of a table query are written into.
///
/// Two rows share a level when path, kind and the first `depth` values of
/// their composite sort keys are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLevel {
    pub path: Vec<String>,
    pub kind: LevelKind,
    pub depth: usize,
}

impl ContainerLevel {
    pub fn object(path: Vec<String>, depth: usize) -> Self {
        ContainerLevel {
            path,
            kind: LevelKind::Object,
            depth,
        }
    }

    pub fn array(path: Vec<String>, depth: usize) -> Self {
        ContainerLevel {
            path,
            kind: LevelKind::Array,
            depth,
        }
    }
}

/// Decoding metadata of one value query
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    /// Feature type the rows belong to
    pub type_name: String,
    /// Table the values are read from
    pub name: String,
    /// Merge tie-break, depth first position of the node in the schema tree
    pub priority: usize,
    pub path: String,
    pub container: Container,
    pub levels: Vec<ContainerLevel>,
    pub object_path: Vec<String>,
    /// Number of sort keys identifying the object values are written into
    pub object_depth: usize,
    pub sort_keys: Vec<SortKey>,
    pub sort_key_names: Vec<String>,
    pub parent_sort_keys: usize,
    /// All columns including constants, which are never selected
    pub columns: Vec<ColumnSql>,
}

impl TableQuery {
    /// `chain` is the path from the root node to `node`, both inclusive
    pub(crate) fn new(type_name: &str, chain: &[&crate::schema::SchemaSql], priority: usize) -> Self {
        let node = chain[chain.len() - 1];

        let mut levels = Vec::new();
        let mut object_path: Vec<String> = vec![];
        for current in chain.iter().skip(1) {
            if let Some(path) = current.container.path() {
                for end in object_path.len() + 1..path.len() {
                    levels.push(ContainerLevel::object(
                        path[..end].to_vec(),
                        current.parent_sort_keys,
                    ));
                }
            }
            match &current.container {
                Container::ObjectArray(path) => {
                    levels.push(ContainerLevel::array(path.clone(), current.parent_sort_keys));
                    levels.push(ContainerLevel::object(path.clone(), current.sort_keys.len()));
                }
                Container::Object(path) => {
                    levels.push(ContainerLevel::object(path.clone(), current.sort_keys.len()));
                }
                Container::ValueArray(path) => {
                    levels.push(ContainerLevel::array(path.clone(), current.parent_sort_keys));
                }
                Container::Feature | Container::Inline => {}
            }
            object_path = current.object_path.clone();
        }

        let object_depth = match &node.container {
            Container::Feature => 1,
            Container::Object(_) | Container::ObjectArray(_) => node.sort_keys.len(),
            Container::ValueArray(_) | Container::Inline => node.parent_sort_keys,
        };

        TableQuery {
            type_name: type_name.to_string(),
            name: node.name().to_string(),
            priority,
            path: node.path.clone(),
            container: node.container.clone(),
            levels,
            object_path: node.object_path.clone(),
            object_depth,
            sort_key_names: node.sort_key_names(),
            sort_keys: node.sort_keys.clone(),
            parent_sort_keys: node.parent_sort_keys,
            columns: node.columns.clone(),
        }
    }

    pub fn is_value_array(&self) -> bool {
        matches!(self.container, Container::ValueArray(_))
    }

    pub fn selected_columns(&self) -> impl Iterator<Item = &ColumnSql> {
        self.columns.iter().filter(|column| !column.is_constant())
    }

    /// Levels for one column: the levels of the table followed by the
    /// inline objects between the node object and the value
    pub fn column_levels(&self, column: &ColumnSql) -> Vec<ContainerLevel> {
        let mut levels = self.levels.clone();
        if self.is_value_array() {
            return levels;
        }

        let start = self.object_path.len() + 1;
        for end in start..column.property_path.len() {
            levels.push(ContainerLevel::object(
                column.property_path[..end].to_vec(),
                self.object_depth,
            ));
        }
        levels
    }
}

/// Parameters of one meta query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaQueryParams<'a> {
    pub limit: u64,
    pub offset: u64,
    /// Last sort key of the previous chunk
    pub after: Option<&'a SqlValue>,
    /// Encoded user filter
    pub filter: Option<&'a str>,
    pub with_number_skipped: bool,
}

#[derive(Debug, Clone)]
pub struct MetaQueryTemplate {
    pub(crate) table: String,
    pub(crate) sort_key: String,
    pub(crate) root_filter: Option<String>,
    pub(crate) compute_number_matched: bool,
    pub(crate) compute_number_skipped: bool,
    pub(crate) dialect: Arc<dyn SqlDialect>,
}

impl MetaQueryTemplate {
    pub fn table(&self) -> &str {
        &self.table
    }

    fn filter(&self, user_filter: Option<&str>) -> Vec<String> {
        self.root_filter
            .iter()
            .map(String::as_str)
            .chain(user_filter)
            .map(|filter| format!("({})", filter))
            .collect()
    }

    pub fn generate(&self, params: &MetaQueryParams<'_>) -> String {
        let dialect = self.dialect.as_ref();
        let filter = self.filter(params.filter);
        let where_filter = to_where(&filter);

        let mut returned_conditions = filter.clone();
        if let Some(after) = params.after {
            returned_conditions.insert(
                0,
                format!("A.{} > {}", self.sort_key, after.to_sql_literal(dialect)),
            );
        }
        let limit = if params.limit > 0 {
            dialect.apply_to_limit(params.limit)
        } else {
            String::new()
        };
        let offset = if params.offset > 0 {
            dialect.apply_to_offset(params.offset)
        } else {
            String::new()
        };

        let number_returned = format!(
            "SELECT MIN({skey}) AS minKey, MAX({skey}) AS maxKey, count(*) AS numberReturned FROM (SELECT A.{sk} AS {skey} FROM {table} A{where} ORDER BY {skey}{limit}{offset}) AS IDS",
            skey = SKEY,
            sk = self.sort_key,
            table = self.table,
            where = to_where(&returned_conditions),
            limit = limit,
            offset = offset,
        );

        let number_matched = if self.compute_number_matched {
            format!(
                "SELECT count(*) AS numberMatched FROM (SELECT A.{} AS {} FROM {} A{} ORDER BY 1) AS IDS",
                self.sort_key, SKEY, self.table, where_filter
            )
        } else {
            dialect.apply_to_no_table(&format!(
                "SELECT {} AS numberMatched",
                dialect.cast_to_big_int(-1)
            ))
        };

        let number_skipped =
            if self.compute_number_skipped && params.with_number_skipped && params.offset > 0 {
                format!(
                    "SELECT CASE WHEN numberReturned = 0 THEN (SELECT count(*) AS numberSkipped FROM (SELECT A.{} AS {} FROM {} A{} ORDER BY 1{}) AS IDS) ELSE {} END AS numberSkipped FROM NR",
                    self.sort_key,
                    SKEY,
                    self.table,
                    where_filter,
                    dialect.apply_to_limit(params.offset),
                    dialect.cast_to_big_int(-1)
                )
            } else {
                dialect.apply_to_no_table(&format!(
                    "SELECT {} AS numberSkipped",
                    dialect.cast_to_big_int(-1)
                ))
            };

        format!(
            "WITH\n{tab}{tab}NR AS ({}),\n{tab}{tab}NM AS ({}),\n{tab}{tab}NS AS ({})\n{tab}SELECT * FROM NR, NM, NS",
            number_returned,
            number_matched,
            number_skipped,
            tab = TAB
        )
    }
}

/// Value query of one table node
#[derive(Debug, Clone)]
pub struct ValueQueryTemplate {
    pub(crate) query: Arc<TableQuery>,
    /// `SELECT` list including sort fields
    pub(crate) select: Vec<String>,
    /// Root table with alias followed by the joins
    pub(crate) from: String,
    pub(crate) root_sort_key: String,
    pub(crate) root_filter: Option<String>,
    pub(crate) dialect: Arc<dyn SqlDialect>,
}

impl ValueQueryTemplate {
    pub fn query(&self) -> &Arc<TableQuery> {
        &self.query
    }

    pub fn generate(&self, min_key: &SqlValue, max_key: &SqlValue, user_filter: Option<&str>) -> String {
        let dialect = self.dialect.as_ref();

        let mut conditions = vec![format!(
            "(A.{sk} >= {} AND A.{sk} <= {})",
            min_key.to_sql_literal(dialect),
            max_key.to_sql_literal(dialect),
            sk = self.root_sort_key
        )];
        conditions.extend(
            self.root_filter
                .iter()
                .map(String::as_str)
                .chain(user_filter)
                .map(|filter| format!("({})", filter)),
        );

        let order_by = (1..=self.query.sort_keys.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            self.select.join(", "),
            self.from,
            to_where(&conditions),
            order_by
        )
    }
}

/// `alias.sk AS SKEY`, `B.sk AS SKEY_1`, row numbers for non unique keys
pub(crate) fn sort_field(alias: &str, sort_key: &SortKey, index: usize) -> String {
    let name = if index == 0 {
        SKEY.to_string()
    } else {
        format!("{}_{}", SKEY, index)
    };

    if sort_key.unique {
        format!("{}.{} AS {}", alias, sort_key.column, name)
    } else {
        format!(
            "ROW_NUMBER() OVER (ORDER BY {}.{}) AS {}",
            alias, sort_key.column, name
        )
    }
}

pub(crate) fn column_field(alias: &str, column: &ColumnSql, dialect: &dyn SqlDialect) -> String {
    let qualified = format!("{}.{}", alias, column.name);
    if column.is_connected() {
        return qualified;
    }

    match column.schema_type {
        SchemaType::Geometry => format!(
            "{} AS {}",
            dialect.apply_to_wkt(&qualified, column.force_polygon_ccw, column.linearize_curves),
            column.name
        ),
        SchemaType::Date => format!("{} AS {}", dialect.apply_to_date(&qualified), column.name),
        SchemaType::Datetime => {
            format!("{} AS {}", dialect.apply_to_datetime(&qualified), column.name)
        }
        _ => qualified,
    }
}

fn to_where(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// All templates of one feature type
#[derive(Debug, Clone)]
pub struct SqlQueryTemplates {
    pub type_name: String,
    pub meta: MetaQueryTemplate,
    pub values: Vec<ValueQueryTemplate>,
}

impl SqlQueryTemplates {
    /// Number of value queries issued in parallel for one chunk
    pub fn max_queries(&self) -> usize {
        self.values.len()
    }

    pub fn table_queries(&self) -> Vec<Arc<TableQuery>> {
        self.values.iter().map(|value| value.query.clone()).collect()
    }
}
