use std::fmt;

use super::ast::{JoinType, SqlPath};
use super::errors::PathParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    OneToN,
    MToN,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "ONE_2_ONE"),
            Cardinality::OneToN => write!(f, "ONE_2_N"),
            Cardinality::MToN => write!(f, "M_2_N"),
        }
    }
}

/// Junction table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Junction {
    pub name: String,
    /// Column referencing the source table
    pub source_field: String,
    /// Column referencing the target table
    pub target_field: String,
    pub filter: Option<String>,
}

/// Typed edge between two tables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlRelation {
    pub cardinality: Cardinality,
    pub source_container: String,
    pub source_field: String,
    pub source_primary_key: String,
    pub source_sort_key: String,
    pub source_filter: Option<String>,
    pub junction: Option<Junction>,
    pub target_container: String,
    pub target_field: String,
    pub target_primary_key: String,
    pub target_sort_key: String,
    pub target_sort_key_unique: bool,
    pub target_filter: Option<String>,
    pub join_type: JoinType,
}

impl SqlRelation {
    pub fn is_one_2_one(&self) -> bool {
        self.cardinality == Cardinality::OneToOne
    }

    pub fn is_one_2_n(&self) -> bool {
        self.cardinality == Cardinality::OneToN
    }

    pub fn is_m_2_n(&self) -> bool {
        self.cardinality == Cardinality::MToN
    }

    /// Whether the target may yield more than one row per source row
    pub fn is_multi(&self) -> bool {
        !self.is_one_2_one()
    }

    /// Path fragment leading from the source to the target table
    pub fn path_fragment(&self) -> String {
        let mut out = String::new();

        match &self.junction {
            Some(junction) => {
                out.push_str(&format!(
                    "[{}={}]{}{{junction}}",
                    self.source_field, junction.source_field, junction.name
                ));
                if let Some(filter) = &junction.filter {
                    out.push_str(&format!("{{filter={}}}", filter));
                }
                out.push_str(&format!(
                    "/[{}={}]{}",
                    junction.target_field, self.target_field, self.target_container
                ));
            }
            None => out.push_str(&format!(
                "[{}={}]{}",
                self.source_field, self.target_field, self.target_container
            )),
        }

        out.push_str(&format!(
            "{{sortKey={}}}{{primaryKey={}}}",
            self.target_sort_key, self.target_primary_key
        ));
        if !self.target_sort_key_unique {
            out.push_str("{sortKeyUnique=false}");
        }
        if self.join_type != JoinType::Inner {
            out.push_str(&format!("{{joinType={}}}", self.join_type));
        }
        if let Some(filter) = &self.target_filter {
            out.push_str(&format!("{{filter={}}}", filter));
        }

        out
    }
}

fn join_of(table: &SqlPath) -> Result<(&str, &str), PathParseError> {
    table
        .join
        .as_ref()
        .map(|(source, target)| (source.as_str(), target.as_str()))
        .ok_or_else(|| PathParseError::MissingJoin {
            table: table.name.clone(),
        })
}

pub(super) fn to_relation(source: &SqlPath, target: &SqlPath) -> Result<SqlRelation, PathParseError> {
    let (source_field, target_field) = join_of(target)?;

    let cardinality = if target_field == target.primary_key {
        Cardinality::OneToOne
    } else {
        Cardinality::OneToN
    };

    Ok(SqlRelation {
        cardinality,
        source_container: source.name.clone(),
        source_field: source_field.to_string(),
        source_primary_key: source.primary_key.clone(),
        source_sort_key: source.sort_key.clone(),
        source_filter: source.filter.clone(),
        junction: None,
        target_container: target.name.clone(),
        target_field: target_field.to_string(),
        target_primary_key: target.primary_key.clone(),
        target_sort_key: target.sort_key.clone(),
        target_sort_key_unique: target.sort_key_unique,
        target_filter: target.filter.clone(),
        join_type: target.join_type,
    })
}

pub(super) fn to_m2n_relation(
    source: &SqlPath,
    link: &SqlPath,
    target: &SqlPath,
) -> Result<SqlRelation, PathParseError> {
    let (source_field, junction_source) = join_of(link)?;
    let (junction_target, target_field) = join_of(target)?;

    Ok(SqlRelation {
        cardinality: Cardinality::MToN,
        source_container: source.name.clone(),
        source_field: source_field.to_string(),
        source_primary_key: source.primary_key.clone(),
        source_sort_key: source.sort_key.clone(),
        source_filter: source.filter.clone(),
        junction: Some(Junction {
            name: link.name.clone(),
            source_field: junction_source.to_string(),
            target_field: junction_target.to_string(),
            filter: link.filter.clone(),
        }),
        target_container: target.name.clone(),
        target_field: target_field.to_string(),
        target_primary_key: target.primary_key.clone(),
        target_sort_key: target.sort_key.clone(),
        target_sort_key_unique: target.sort_key_unique,
        target_filter: target.filter.clone(),
        join_type: target.join_type,
    })
}

/// Walk a table chain, root first, and emit its relations.
///
/// A junction between two tables collapses into one M:N relation. A leading
/// junction in a chain of three or more is skipped, a trailing junction is
/// joined like a plain table. Several junctions in one chain yield several
/// M:N hops, adjacent junctions are rejected.
pub(super) fn extract(tables: &[&SqlPath]) -> Result<Vec<SqlRelation>, PathParseError> {
    if tables.len() < 2 {
        return Ok(vec![]);
    }

    if let Some(pair) = tables.windows(2).find(|w| w[0].junction && w[1].junction) {
        return Err(PathParseError::UnsupportedJunctionChain {
            tables: format!("{}/{}", pair[0].name, pair[1].name),
        });
    }

    let mut relations = Vec::with_capacity(tables.len() - 1);
    let mut i = if tables[0].junction && tables.len() >= 3 {
        1
    } else {
        0
    };

    while i + 1 < tables.len() {
        let source = tables[i];
        let next = tables[i + 1];

        if next.junction && i + 2 < tables.len() {
            relations.push(to_m2n_relation(source, next, tables[i + 2])?);
            i += 2;
        } else {
            relations.push(to_relation(source, next)?);
            i += 1;
        }
    }

    Ok(relations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> SqlPath {
        SqlPath::table(name, "id", "id")
    }

    fn joined(name: &str, source: &str, target: &str) -> SqlPath {
        let mut path = table(name);
        path.join = Some((source.to_string(), target.to_string()));
        path
    }

    fn junction(name: &str, source: &str, target: &str) -> SqlPath {
        let mut path = joined(name, source, target);
        path.junction = true;
        path
    }

    #[test]
    fn test_cardinality() {
        let kita = table("kita");
        let plaetze = joined("plaetze", "oid", "kita_fk");
        let adresse = joined("adresse", "adresse_fk", "id");

        let one_to_n = extract(&[&kita, &plaetze]).unwrap();
        assert_eq!(one_to_n.len(), 1);
        assert_eq!(one_to_n[0].cardinality, Cardinality::OneToN);
        assert_eq!(one_to_n[0].source_field, "oid");
        assert_eq!(one_to_n[0].target_field, "kita_fk");

        let one_to_one = extract(&[&kita, &adresse]).unwrap();
        assert_eq!(one_to_one[0].cardinality, Cardinality::OneToOne);
    }

    #[test]
    fn test_junction_collapse() {
        let a = table("a");
        let link = junction("a_2_b", "id", "fka");
        let b = joined("b", "fkb", "id");

        let relations = extract(&[&a, &link, &b]).unwrap();
        assert_eq!(relations.len(), 1);

        let relation = &relations[0];
        assert_eq!(relation.cardinality, Cardinality::MToN);
        assert_eq!(relation.source_container, "a");
        assert_eq!(relation.source_field, "id");
        assert_eq!(relation.target_container, "b");
        assert_eq!(relation.target_field, "id");

        let junction = relation.junction.as_ref().unwrap();
        assert_eq!(junction.name, "a_2_b");
        assert_eq!(junction.source_field, "fka");
        assert_eq!(junction.target_field, "fkb");
    }

    #[test]
    fn test_leading_junction_is_skipped() {
        let link = junction("a_2_b", "id", "fka");
        let b = joined("b", "fkb", "id");
        let c = joined("c", "id", "b_fk");

        let relations = extract(&[&link, &b, &c]).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source_container, "b");
        assert_eq!(relations[0].target_container, "c");
    }

    #[test]
    fn test_trailing_junction_is_plain_edge() {
        let a = table("a");
        let link = junction("a_2_b", "id", "fka");

        let relations = extract(&[&a, &link]).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].cardinality, Cardinality::OneToN);
        assert_eq!(relations[0].target_container, "a_2_b");
    }

    #[test]
    fn test_plain_chain_has_no_duplicate_edges() {
        let a = table("a");
        let b = joined("b", "id", "a_fk");
        let c = joined("c", "id", "b_fk");
        let d = joined("d", "id", "c_fk");

        let relations = extract(&[&a, &b, &c, &d]).unwrap();
        let targets: Vec<_> = relations.iter().map(|r| r.target_container.as_str()).collect();
        assert_eq!(targets, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_two_junctions_are_two_hops() {
        let a = table("a");
        let ab = junction("a_2_b", "id", "a_id");
        let b = joined("b", "b_id", "id");
        let bc = junction("b_2_c", "id", "b_id");
        let c = joined("c", "c_id", "id");

        let relations = extract(&[&a, &ab, &b, &bc, &c]).unwrap();
        assert_eq!(relations.len(), 2);
        assert!(relations.iter().all(SqlRelation::is_m_2_n));
        assert_eq!(relations[1].source_container, "b");
    }

    #[test]
    fn test_adjacent_junctions_are_rejected() {
        let a = table("a");
        let ab = junction("a_2_b", "id", "a_id");
        let bc = junction("b_2_c", "b_id", "id");
        let c = joined("c", "c_id", "id");

        assert!(matches!(
            extract(&[&a, &ab, &bc, &c]),
            Err(PathParseError::UnsupportedJunctionChain { .. })
        ));
    }

    #[test]
    fn test_path_fragment() {
        let a = table("a");
        let link = junction("a_2_b", "id", "fka");
        let b = joined("b", "fkb", "id");
        let relations = extract(&[&a, &link, &b]).unwrap();

        assert_eq!(
            relations[0].path_fragment(),
            "[id=fka]a_2_b{junction}/[fkb=id]b{sortKey=id}{primaryKey=id}"
        );
    }
}
