use std::fmt;

use super::feature_schema::{Role, SchemaType};
use crate::sql_path::{SqlPath, SqlRelation};

/// Where the rows of a table node end up in the feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    /// The feature itself, only for root nodes
    Feature,
    /// One nested object per parent row
    Object(Vec<String>),
    /// One array element per row
    ObjectArray(Vec<String>),
    /// One array value per row
    ValueArray(Vec<String>),
    /// Values are written into the object of the parent node
    Inline,
}

impl Container {
    pub fn path(&self) -> Option<&[String]> {
        match self {
            Container::Object(path) | Container::ObjectArray(path) | Container::ValueArray(path) => {
                Some(path)
            }
            Container::Feature | Container::Inline => None,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Feature => write!(f, "feature"),
            Container::Object(path) => write!(f, "object {}", path.join(".")),
            Container::ObjectArray(path) => write!(f, "object array {}", path.join(".")),
            Container::ValueArray(path) => write!(f, "value array {}", path.join(".")),
            Container::Inline => write!(f, "inline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    Column,
    /// Literal injected by the decoder, never selected
    Constant(String),
    /// Column decoded by a sub-decoder, with the dotted path inside it
    Connected {
        connector: String,
        path: Option<String>,
    },
}

/// One projected column of a table node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSql {
    pub name: String,
    /// Property path from the feature root
    pub property_path: Vec<String>,
    pub schema_type: SchemaType,
    pub value_type: Option<SchemaType>,
    pub role: Option<Role>,
    pub source: ColumnSource,
    pub force_polygon_ccw: bool,
    pub linearize_curves: bool,
    pub format: Option<String>,
    /// Columns sharing a group are alternatives, the first non-null wins
    pub coalesce_group: Option<usize>,
}

impl ColumnSql {
    pub fn new(name: impl Into<String>, property_path: Vec<String>, schema_type: SchemaType) -> Self {
        ColumnSql {
            name: name.into(),
            property_path,
            schema_type,
            value_type: None,
            role: None,
            source: ColumnSource::Column,
            force_polygon_ccw: true,
            linearize_curves: false,
            format: None,
            coalesce_group: None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.source, ColumnSource::Constant(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.source, ColumnSource::Connected { .. })
    }

    pub fn is_spatial(&self) -> bool {
        self.schema_type == SchemaType::Geometry
    }

    pub fn dotted_path(&self) -> String {
        self.property_path.join(".")
    }
}

/// Sort key column of one table in a join chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Position of the table in the chain, 0 is the root table
    pub table: usize,
    pub container: String,
    pub column: String,
    pub unique: bool,
}

impl SortKey {
    pub fn name(&self) -> String {
        format!("{}.{}", self.container, self.column)
    }
}

/// Relational schema node: one table reached from the root table through
/// `relations`, with the columns read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSql {
    /// The table itself, without parent tables
    pub segment: SqlPath,
    pub container: Container,
    /// Full chain from the root table
    pub relations: Vec<SqlRelation>,
    /// Composite sort key, root first
    pub sort_keys: Vec<SortKey>,
    /// Number of leading sort keys that belong to the parent node
    pub parent_sort_keys: usize,
    /// Path of the object the values of this node are written into
    pub object_path: Vec<String>,
    /// Source path of the table, root first
    pub path: String,
    pub columns: Vec<ColumnSql>,
    pub children: Vec<SchemaSql>,
}

impl SchemaSql {
    pub fn root(segment: SqlPath) -> Self {
        let sort_keys = vec![SortKey {
            table: 0,
            container: segment.name.clone(),
            column: segment.sort_key.clone(),
            unique: segment.sort_key_unique,
        }];
        let path = format!("/{}", segment.as_path());

        SchemaSql {
            segment: segment.detached(),
            container: Container::Feature,
            relations: vec![],
            sort_keys,
            parent_sort_keys: 0,
            object_path: vec![],
            path,
            columns: vec![],
            children: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.segment.name
    }

    pub fn sort_key(&self) -> &str {
        &self.segment.sort_key
    }

    pub fn primary_key(&self) -> &str {
        &self.segment.primary_key
    }

    pub fn is_root(&self) -> bool {
        self.relations.is_empty()
    }

    /// Filter of the root table, joined tables carry theirs in the relation
    pub fn filter(&self) -> Option<&str> {
        if self.is_root() {
            self.segment.filter.as_deref()
        } else {
            None
        }
    }

    /// Names identifying each sort key by the join chain that reaches its
    /// table, so siblings joined to the same table get distinct names
    pub fn sort_key_names(&self) -> Vec<String> {
        self.sort_keys
            .iter()
            .map(|key| {
                let chain = &self.relations[..key.table.min(self.relations.len())];
                if chain.is_empty() {
                    return key.name();
                }
                let fragments: Vec<String> = chain.iter().map(SqlRelation::path_fragment).collect();
                format!(
                    "{}/{}.{}",
                    self.sort_keys[0].container,
                    fragments.join("/"),
                    key.column
                )
            })
            .collect()
    }

    /// Child reached through `relations` into `container`, created when missing
    pub fn child_for(
        &mut self,
        relations: Vec<SqlRelation>,
        segment: &SqlPath,
        container: Container,
    ) -> &mut SchemaSql {
        let mut chain = self.relations.clone();
        chain.extend(relations.iter().cloned());

        if let Some(index) = self
            .children
            .iter()
            .position(|child| child.relations == chain && child.container == container)
        {
            return &mut self.children[index];
        }

        let mut sort_keys = self.sort_keys.clone();
        let last = relations.len().saturating_sub(1);
        for (i, relation) in relations.iter().enumerate() {
            if i == last || relation.is_multi() {
                sort_keys.push(SortKey {
                    table: self.relations.len() + i + 1,
                    container: relation.target_container.clone(),
                    column: relation.target_sort_key.clone(),
                    unique: relation.target_sort_key_unique,
                });
            }
        }

        let object_path = match &container {
            Container::Object(path) | Container::ObjectArray(path) => path.clone(),
            _ => self.object_path.clone(),
        };
        let fragments: Vec<String> = relations.iter().map(SqlRelation::path_fragment).collect();
        let path = format!("{}/{}", self.path, fragments.join("/"));

        self.children.push(SchemaSql {
            segment: segment.detached(),
            container,
            relations: chain,
            parent_sort_keys: self.sort_keys.len(),
            sort_keys,
            object_path,
            path,
            columns: vec![],
            children: vec![],
        });

        let index = self.children.len() - 1;
        &mut self.children[index]
    }

    /// This node and all descendants, depth first
    pub fn nodes(&self) -> Vec<&SchemaSql> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.nodes());
        }
        nodes
    }

    /// Nodes that need a value query; the root always does since its rows
    /// start the features
    pub fn value_nodes(&self) -> Vec<&SchemaSql> {
        self.nodes()
            .into_iter()
            .filter(|node| node.is_root() || !node.columns.is_empty())
            .collect()
    }

    pub fn find_column(&self, property_path: &str) -> Option<(&SchemaSql, &ColumnSql)> {
        self.nodes().into_iter().find_map(|node| {
            node.columns
                .iter()
                .find(|column| column.dotted_path() == property_path)
                .map(|column| (node, column))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcePathDefaults;
    use crate::sql_path::SqlPathParser;

    #[test]
    fn test_child_sort_keys_and_path() {
        let parser = SqlPathParser::new(&SourcePathDefaults::default(), Vec::<String>::new()).unwrap();
        let root_path = parser.parse_table_path("/kita{sortKey=id}").unwrap();
        let child_path = parser.parse_table_path("[oid=kita_fk]plaetze").unwrap();
        let relations = parser.extract_relations(&root_path, &child_path).unwrap();

        let mut root = SchemaSql::root(root_path);
        let child = root.child_for(
            relations.clone(),
            &child_path,
            Container::ObjectArray(vec!["plaetze".into()]),
        );
        assert_eq!(
            child.sort_key_names(),
            vec!["kita.id", "kita/[oid=kita_fk]plaetze{sortKey=id}{primaryKey=id}.id"]
        );
        assert_eq!(child.parent_sort_keys, 1);
        assert_eq!(child.object_path, vec!["plaetze".to_string()]);
        assert_eq!(
            child.path,
            "/kita{sortKey=id}{primaryKey=id}/[oid=kita_fk]plaetze{sortKey=id}{primaryKey=id}"
        );

        root.child_for(relations, &child_path, Container::ObjectArray(vec!["plaetze".into()]));
        assert_eq!(root.children.len(), 1);
    }
}
