//! Relational schema and query template derivation across dialects

#[cfg(test)]
mod template_derivation_tests {
    use std::sync::Arc;

    use featurestore_sql::config::{QueryGeneration, SourcePathDefaults};
    use featurestore_sql::connector::SqlValue;
    use featurestore_sql::dialect::{SqlDialect, SqlDialectGpkg, SqlDialectPostGis};
    use featurestore_sql::query::{MetaQueryParams, QueryTemplateDeriver, SqlQueryTemplates};
    use featurestore_sql::schema::{FeatureSchema, SchemaDeriver};
    use featurestore_sql::sql_path::SqlPathParser;

    const KITA: &str = r#"
name: kita
sourcePath: /kita
type: OBJECT
properties:
  id:
    sourcePath: id
    type: INTEGER
    role: ID
  geometry:
    sourcePath: geom
    type: GEOMETRY
    role: PRIMARY_GEOMETRY
  kategorie:
    type: STRING
    constant: KITA
  plaetze:
    sourcePath: '[id=kita_fk]plaetze'
    type: OBJECT_ARRAY
    properties:
      anzahl:
        sourcePath: anzahl
        type: INTEGER
"#;

    fn templates(dialect: Arc<dyn SqlDialect>, settings: QueryGeneration) -> SqlQueryTemplates {
        let schema: FeatureSchema = serde_yaml::from_str(KITA).unwrap();
        let parser = SqlPathParser::new(&SourcePathDefaults::default(), Vec::<String>::new()).unwrap();
        let root = SchemaDeriver::new(&parser).derive(&schema).unwrap().remove(0);
        QueryTemplateDeriver::new(dialect, settings)
            .derive("kita", &root)
            .unwrap()
    }

    #[test]
    fn test_one_value_query_per_table() {
        let templates = templates(Arc::new(SqlDialectPostGis), QueryGeneration::default());
        assert_eq!(templates.max_queries(), 2);
        let names: Vec<String> = templates
            .table_queries()
            .iter()
            .map(|query| query.name.clone())
            .collect();
        assert_eq!(names, vec!["kita", "plaetze"]);
    }

    #[test]
    fn test_geometry_and_constants_in_value_query() {
        let min = SqlValue::Int(1);
        let max = SqlValue::Int(5);

        let postgis = templates(Arc::new(SqlDialectPostGis), QueryGeneration::default());
        let sql = postgis.values[0].generate(&min, &max, None);
        assert!(sql.contains("ST_AsText(ST_ForcePolygonCCW(A.geom)) AS geom"));
        assert!(!sql.contains("KITA"));

        let gpkg = templates(Arc::new(SqlDialectGpkg), QueryGeneration::default());
        let sql = gpkg.values[0].generate(&min, &max, None);
        assert!(sql.contains("ST_AsText(ST_ForcePolygonCCW(A.geom)) AS geom"));
        assert!(sql.contains("(A.id >= 1 AND A.id <= 5)"));
    }

    #[test]
    fn test_meta_query_without_number_matched() {
        let settings = QueryGeneration {
            compute_number_matched: false,
            ..Default::default()
        };
        let templates = templates(Arc::new(SqlDialectPostGis), settings);
        let after = SqlValue::Int(20);
        let meta = templates.meta.generate(&MetaQueryParams {
            limit: 10,
            after: Some(&after),
            ..Default::default()
        });

        assert!(meta.starts_with("WITH"));
        assert!(meta.contains("A.id > 20"));
        assert!(meta.contains("LIMIT 10"));
        assert!(!meta.contains("numberMatched FROM"));
        assert!(meta.ends_with("SELECT * FROM NR, NM, NS"));
    }
}
