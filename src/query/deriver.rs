use std::sync::Arc;

use log::debug;

use super::alias::Aliases;
use super::errors::QueryError;
use super::join::join_clauses;
use super::templates::{
    column_field, sort_field, MetaQueryTemplate, SqlQueryTemplates, TableQuery, ValueQueryTemplate,
};
use crate::config::QueryGeneration;
use crate::dialect::SqlDialect;
use crate::filter::CqlFilter;
use crate::schema::SchemaSql;

/// Derives the query templates of a feature type from its relational schema
#[derive(Debug, Clone)]
pub struct QueryTemplateDeriver {
    dialect: Arc<dyn SqlDialect>,
    settings: QueryGeneration,
}

impl QueryTemplateDeriver {
    pub fn new(dialect: Arc<dyn SqlDialect>, settings: QueryGeneration) -> Self {
        QueryTemplateDeriver { dialect, settings }
    }

    pub fn derive(&self, type_name: &str, root: &SchemaSql) -> Result<SqlQueryTemplates, QueryError> {
        if root.sort_key().is_empty() {
            return Err(QueryError::MissingSortKey {
                table: root.name().to_string(),
            });
        }

        let root_filter = root
            .filter()
            .map(|filter| {
                CqlFilter::parse(filter)?.to_sql_with_alias("A", self.dialect.as_ref())
            })
            .transpose()?;

        let meta = MetaQueryTemplate {
            table: root.name().to_string(),
            sort_key: root.sort_key().to_string(),
            root_filter: root_filter.clone(),
            compute_number_matched: self.settings.compute_number_matched,
            compute_number_skipped: self.settings.compute_number_skipped,
            dialect: self.dialect.clone(),
        };

        let mut chains = Vec::new();
        collect_chains(root, &mut vec![], &mut chains);

        let values = chains
            .iter()
            .enumerate()
            .map(|(priority, chain)| self.value_template(type_name, root, chain, priority, &root_filter))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Derived {} value queries for feature type {}",
            values.len(),
            type_name
        );

        Ok(SqlQueryTemplates {
            type_name: type_name.to_string(),
            meta,
            values,
        })
    }

    fn value_template(
        &self,
        type_name: &str,
        root: &SchemaSql,
        chain: &[&SchemaSql],
        priority: usize,
        root_filter: &Option<String>,
    ) -> Result<ValueQueryTemplate, QueryError> {
        let node = chain[chain.len() - 1];
        let aliases = Aliases::for_relations(&node.relations, "");
        let dialect = self.dialect.as_ref();

        let mut select: Vec<String> = node
            .sort_keys
            .iter()
            .enumerate()
            .map(|(i, key)| sort_field(&aliases.tables[key.table], key, i))
            .collect();
        select.extend(
            node.columns
                .iter()
                .filter(|column| !column.is_constant())
                .map(|column| column_field(aliases.target(), column, dialect)),
        );

        let mut from = format!("{} {}", root.name(), aliases.root());
        for join in join_clauses(&node.relations, &aliases, dialect)? {
            from.push(' ');
            from.push_str(&join);
        }

        Ok(ValueQueryTemplate {
            query: Arc::new(TableQuery::new(type_name, chain, priority)),
            select,
            from,
            root_sort_key: root.sort_key().to_string(),
            root_filter: root_filter.clone(),
            dialect: self.dialect.clone(),
        })
    }
}

/// Root to node chains of all nodes needing a value query, depth first
fn collect_chains<'a>(
    node: &'a SchemaSql,
    chain: &mut Vec<&'a SchemaSql>,
    out: &mut Vec<Vec<&'a SchemaSql>>,
) {
    chain.push(node);
    if node.is_root() || !node.columns.is_empty() {
        out.push(chain.clone());
    }
    for child in &node.children {
        collect_chains(child, chain, out);
    }
    chain.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcePathDefaults;
    use crate::connector::SqlValue;
    use crate::dialect::SqlDialectPostGis;
    use crate::query::templates::{ContainerLevel, LevelKind, MetaQueryParams};
    use crate::schema::{Container, FeatureSchema, SchemaDeriver, SchemaType};
    use crate::sql_path::SqlPathParser;

    fn kita() -> FeatureSchema {
        FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita{sortKey=id}")
            .with_properties(vec![
                FeatureSchema::new("id", SchemaType::String).with_source_path("id"),
                FeatureSchema::new("kategorie", SchemaType::String).with_constant("KITA"),
                FeatureSchema::new("plaetze", SchemaType::ObjectArray)
                    .with_source_path(
                        "[oid=kita_fk]plaetze{filter=anzahl IS NOT NULL AND anzahl>0}",
                    )
                    .with_properties(vec![
                        FeatureSchema::new("anzahl", SchemaType::Integer).with_source_path("anzahl"),
                    ]),
            ])
    }

    fn templates(schema: &FeatureSchema) -> SqlQueryTemplates {
        let parser = SqlPathParser::new(&SourcePathDefaults::default(), Vec::<String>::new()).unwrap();
        let root = SchemaDeriver::new(&parser).derive(schema).unwrap().remove(0);
        QueryTemplateDeriver::new(Arc::new(SqlDialectPostGis), QueryGeneration::default())
            .derive("kita", &root)
            .unwrap()
    }

    #[test]
    fn test_value_queries() {
        let templates = templates(&kita());
        assert_eq!(templates.max_queries(), 2);

        let min = SqlValue::Int(1);
        let max = SqlValue::Int(10);
        assert_eq!(
            templates.values[0].generate(&min, &max, None),
            "SELECT A.id AS SKEY, A.id FROM kita A WHERE (A.id >= 1 AND A.id <= 10) ORDER BY 1"
        );
        assert_eq!(
            templates.values[1].generate(&min, &max, Some("A.id = 'x'")),
            "SELECT A.id AS SKEY, B.id AS SKEY_1, B.anzahl FROM kita A JOIN plaetze B ON (A.oid=B.kita_fk AND ((B.anzahl IS NOT NULL AND B.anzahl > 0))) WHERE (A.id >= 1 AND A.id <= 10) AND (A.id = 'x') ORDER BY 1,2"
        );
    }

    #[test]
    fn test_table_query_metadata() {
        let templates = templates(&kita());
        let root = templates.values[0].query();
        assert_eq!(root.priority, 0);
        assert_eq!(root.object_depth, 1);
        assert!(root.levels.is_empty());
        assert_eq!(root.columns.len(), 2);
        assert_eq!(root.selected_columns().count(), 1);

        let plaetze = templates.values[1].query();
        assert_eq!(plaetze.priority, 1);
        assert_eq!(plaetze.type_name, "kita");
        assert_eq!(plaetze.sort_key_names[0], "kita.id");
        assert!(plaetze.sort_key_names[1].starts_with("kita/["));
        assert!(plaetze.sort_key_names[1].ends_with(".id"));
        assert_eq!(plaetze.object_depth, 2);
        assert_eq!(
            plaetze.levels,
            vec![
                ContainerLevel {
                    path: vec!["plaetze".into()],
                    kind: LevelKind::Array,
                    depth: 1
                },
                ContainerLevel {
                    path: vec!["plaetze".into()],
                    kind: LevelKind::Object,
                    depth: 2
                },
            ]
        );
    }

    #[test]
    fn test_root_filter_applies_to_meta_and_values() {
        let schema = FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita{filter=aktiv = TRUE}")
            .with_properties(vec![
                FeatureSchema::new("name", SchemaType::String).with_source_path("name"),
            ]);
        let templates = templates(&schema);

        let meta = templates.meta.generate(&MetaQueryParams {
            limit: 10,
            ..Default::default()
        });
        assert!(meta.contains("FROM kita A WHERE (A.aktiv = TRUE) ORDER BY SKEY LIMIT 10"));

        let values = templates.values[0].generate(&SqlValue::Int(1), &SqlValue::Int(2), None);
        assert!(values.ends_with("WHERE (A.id >= 1 AND A.id <= 2) AND (A.aktiv = TRUE) ORDER BY 1"));
    }

    #[test]
    fn test_inline_object_levels() {
        let schema = FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita")
            .with_properties(vec![FeatureSchema::new("kontakt", SchemaType::Object)
                .with_properties(vec![
                    FeatureSchema::new("email", SchemaType::String).with_source_path("email"),
                ])]);
        let templates = templates(&schema);
        let root = templates.values[0].query();
        assert_eq!(root.container, Container::Feature);
        assert_eq!(
            root.column_levels(&root.columns[0]),
            vec![ContainerLevel {
                path: vec!["kontakt".into()],
                kind: LevelKind::Object,
                depth: 1
            }]
        );
    }
}
