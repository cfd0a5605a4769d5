use std::fmt;

/// SQL join kind of a joined table, selected with `{joinType=..}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn from_flag(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INNER" => Some(JoinType::Inner),
            "LEFT" => Some(JoinType::Left),
            "RIGHT" => Some(JoinType::Right),
            "FULL" => Some(JoinType::Full),
            _ => None,
        }
    }

    /// Prefix in front of `JOIN`, empty for inner joins
    pub fn sql_prefix(&self) -> &'static str {
        match self {
            JoinType::Inner => "",
            JoinType::Left => "LEFT ",
            JoinType::Right => "RIGHT ",
            JoinType::Full => "FULL ",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
        }
    }
}

/// One parsed segment of a source path.
///
/// A segment is a root table (no join, no columns), a joined table (has a
/// join), a column leaf (has columns) or a connected column (has a connector).
/// The tables in front of the segment are kept in `parent_tables`, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPath {
    pub name: String,
    pub parent_tables: Vec<SqlPath>,
    /// `(sourceField, targetField)` from `[sourceField=targetField]`
    pub join: Option<(String, String)>,
    pub join_type: JoinType,
    pub connector: Option<String>,
    /// Dotted path inside the connected column, `a.b` for `[JSON]col/a/b`
    pub path_in_connector: Option<String>,
    pub columns: Vec<String>,
    pub sort_key: String,
    pub primary_key: String,
    pub sort_key_unique: bool,
    /// CQL2 text of a `{filter=..}` flag
    pub filter: Option<String>,
    /// Literal of a `{constant=..}` flag, quotes included
    pub constant_value: Option<String>,
    pub junction: bool,
}

impl SqlPath {
    pub fn table(name: impl Into<String>, sort_key: &str, primary_key: &str) -> Self {
        SqlPath {
            name: name.into(),
            parent_tables: vec![],
            join: None,
            join_type: JoinType::Inner,
            connector: None,
            path_in_connector: None,
            columns: vec![],
            sort_key: sort_key.to_string(),
            primary_key: primary_key.to_string(),
            sort_key_unique: true,
            filter: None,
            constant_value: None,
            junction: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.join.is_none() && self.columns.is_empty() && self.connector.is_none()
    }

    pub fn is_branch(&self) -> bool {
        self.join.is_some() && self.columns.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_some()
    }

    pub fn is_column(&self) -> bool {
        !self.columns.is_empty() && self.connector.is_none()
    }

    pub fn is_constant(&self) -> bool {
        self.constant_value.is_some()
    }

    /// This segment without its parent tables
    pub fn detached(&self) -> SqlPath {
        SqlPath {
            parent_tables: vec![],
            ..self.clone()
        }
    }

    /// Render this segment alone back into path syntax
    pub fn as_path(&self) -> String {
        let mut out = String::new();

        if let Some(connector) = &self.connector {
            out.push_str(&format!("[{}]{}", connector, self.name));
            if let Some(inner) = &self.path_in_connector {
                for segment in inner.split('.') {
                    out.push('/');
                    out.push_str(segment);
                }
            }
            return out;
        }

        if let Some((source, target)) = &self.join {
            out.push_str(&format!("[{}={}]", source, target));
        }
        out.push_str(&self.name);

        if self.columns.is_empty() {
            out.push_str(&format!("{{sortKey={}}}", self.sort_key));
            out.push_str(&format!("{{primaryKey={}}}", self.primary_key));
            if !self.sort_key_unique {
                out.push_str("{sortKeyUnique=false}");
            }
            if self.join_type != JoinType::Inner {
                out.push_str(&format!("{{joinType={}}}", self.join_type));
            }
            if self.junction {
                out.push_str("{junction}");
            }
        }
        if let Some(filter) = &self.filter {
            out.push_str(&format!("{{filter={}}}", filter));
        }
        if let Some(constant) = &self.constant_value {
            out.push_str(&format!("{{constant={}}}", constant));
        }

        out
    }

    /// Render the segment including its parent tables
    pub fn full_path(&self) -> String {
        let mut segments: Vec<String> = self.parent_tables.iter().map(SqlPath::as_path).collect();
        segments.push(self.as_path());

        let joined = segments.join("/");
        let starts_with_root = self
            .parent_tables
            .first()
            .map(SqlPath::is_root)
            .unwrap_or_else(|| self.is_root());

        if starts_with_root {
            format!("/{}", joined)
        } else {
            joined
        }
    }
}
