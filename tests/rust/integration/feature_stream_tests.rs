//! Feature queries from configuration to JSON features

#[cfg(test)]
mod feature_stream_tests {
    use featurestore_sql::connector::{MemorySqlClient, PoolRegistry, SqlValue};
    use featurestore_sql::decoder::FeatureEvent;
    use featurestore_sql::{FeatureQuery, ProviderError};
    use futures_util::StreamExt;
    use serde_json::json;

    use crate::common::{config, meta, start, start_with, KITAS};

    const KITA_VALUES: &str = "SELECT A.id AS SKEY, A.id, A.name FROM kita A";
    const PLAETZE_VALUES: &str = "SELECT A.id AS SKEY, B.id AS SKEY_1, B.anzahl FROM kita A";

    fn kitas() -> MemorySqlClient {
        let client = MemorySqlClient::new();
        client
            .on("WITH", vec![meta(1, 2, 2, 2)])
            .on(
                KITA_VALUES,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(1), "Sonne".into()],
                    vec![SqlValue::Int(2), SqlValue::Int(2), "Mond".into()],
                ],
            )
            .on(
                PLAETZE_VALUES,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::Int(25)],
                    vec![SqlValue::Int(1), SqlValue::Int(11), SqlValue::Int(5)],
                    vec![SqlValue::Int(2), SqlValue::Int(12), SqlValue::Int(8)],
                ],
            );
        client
    }

    #[tokio::test]
    async fn test_features_with_object_arrays() {
        let client = kitas();
        let provider = start(&client);

        let collection = provider
            .get_feature_collection(&FeatureQuery::of("kita"))
            .await
            .unwrap();

        assert_eq!(collection.number_matched, Some(2));
        assert_eq!(collection.number_returned, 2);
        assert_eq!(
            collection.features,
            vec![
                json!({"id": 1, "name": "Sonne", "plaetze": [{"anzahl": 25}, {"anzahl": 5}]}),
                json!({"id": 2, "name": "Mond", "plaetze": [{"anzahl": 8}]}),
            ]
        );

        let executed = client.executed();
        assert_eq!(executed.len(), 3);
        let plaetze = executed
            .iter()
            .find(|sql| sql.starts_with(PLAETZE_VALUES))
            .unwrap();
        assert!(plaetze.contains("JOIN plaetze B ON (A.id=B.kita_fk AND ((B.anzahl IS NOT NULL AND B.anzahl > 0)))"));
        assert!(plaetze.contains("(A.id >= 1 AND A.id <= 2)"));
    }

    #[tokio::test]
    async fn test_event_stream_starts_with_meta() {
        let provider = start(&kitas());
        let events: Vec<FeatureEvent> = provider
            .get_features(&FeatureQuery::of("kita"))
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;

        assert!(matches!(&events[0], FeatureEvent::Meta(meta) if meta.number_returned == 2));
        assert_eq!(events[1], FeatureEvent::feature_start("kita"));
        assert_eq!(events.last(), Some(&FeatureEvent::FeatureEnd));
        let features = events
            .iter()
            .filter(|event| event.is_feature_start())
            .count();
        assert_eq!(features, 2);
    }

    #[tokio::test]
    async fn test_filter_on_joined_property() {
        let client = MemorySqlClient::new();
        let provider = start(&client);

        let collection = provider
            .get_feature_collection(&FeatureQuery::of("kita").with_filter("plaetze.anzahl > 20"))
            .await
            .unwrap();
        assert!(collection.features.is_empty());

        let meta_query = &client.executed()[0];
        assert!(meta_query.starts_with("WITH"));
        assert!(meta_query.contains("A.id IN (SELECT AA.kita_fk FROM plaetze AA WHERE"));
        assert!(meta_query.contains("AA.anzahl > 20"));
    }

    #[tokio::test]
    async fn test_paging_parameters() {
        let client = MemorySqlClient::new();
        client.on("WITH", vec![meta(2, 2, 1, 2)]);
        let provider = start(&client);

        provider
            .get_feature_collection(&FeatureQuery::of("kita").with_limit(1).with_offset(1))
            .await
            .unwrap();

        let meta_query = &client.executed()[0];
        assert!(meta_query.contains("ORDER BY SKEY LIMIT 1 OFFSET 1"));
    }

    #[tokio::test]
    async fn test_invalid_filter() {
        let provider = start(&MemorySqlClient::new());
        let result = provider
            .get_features(&FeatureQuery::of("kita").with_filter("farbe = 'rot'"))
            .await;
        assert!(matches!(result, Err(ProviderError::Filter(_))));
    }

    #[tokio::test]
    async fn test_null_root_sort_key_fails_the_stream() {
        let client = MemorySqlClient::new();
        client
            .on("WITH", vec![meta(1, 1, 1, 1)])
            .on(KITA_VALUES, vec![vec![SqlValue::Null, SqlValue::Null, "Sonne".into()]]);
        let provider = start(&client);

        let error = provider
            .get_feature_collection(&FeatureQuery::of("kita"))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("may not be null"));
    }

    fn with_schule() -> featurestore_sql::config::ProviderConfig {
        let yaml = format!(
            "{}{}",
            KITAS,
            r#"
  schule:
    sourcePath: /schule
    type: OBJECT
    properties:
      id:
        sourcePath: id
        type: INTEGER
        role: ID
      name:
        sourcePath: name
        type: STRING
"#
        );
        featurestore_sql::config::ProviderConfig::from_yaml_str(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_types_with_equal_ids_stay_separate() {
        let client = MemorySqlClient::new();
        client
            .on("WITH", vec![meta(1, 3, 2, 2)])
            .on(
                KITA_VALUES,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(1), "Sonne".into()],
                    vec![SqlValue::Int(2), SqlValue::Int(2), "Mond".into()],
                ],
            )
            .on(
                "SELECT A.id AS SKEY, A.id, A.name FROM schule A",
                vec![
                    vec![SqlValue::Int(2), SqlValue::Int(2), "Linden".into()],
                    vec![SqlValue::Int(3), SqlValue::Int(3), "Eichen".into()],
                ],
            );
        let provider = start_with(with_schule(), &PoolRegistry::new(), &client, 2).unwrap();

        let events: Vec<FeatureEvent> = provider
            .get_features(&FeatureQuery::of("kita").and("schule"))
            .await
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                FeatureEvent::FeatureStart { type_name } => Some(type_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(types, vec!["kita", "kita", "schule", "schule"]);

        let collection = provider
            .get_feature_collection(&FeatureQuery::of("kita").and("schule"))
            .await
            .unwrap();
        assert_eq!(collection.number_returned, 4);
        assert_eq!(
            collection.features,
            vec![
                json!({"id": 1, "name": "Sonne"}),
                json!({"id": 2, "name": "Mond"}),
                json!({"id": 2, "name": "Linden"}),
                json!({"id": 3, "name": "Eichen"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_multiple_types_in_one_stream() {
        let config = with_schule();

        let client = MemorySqlClient::new();
        client
            .on("WITH", vec![meta(1, 2, 2, 2)])
            .on(
                KITA_VALUES,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(1), "Sonne".into()],
                    vec![SqlValue::Int(2), SqlValue::Int(2), "Mond".into()],
                ],
            )
            .on(
                "SELECT A.id AS SKEY, A.id, A.name FROM schule A",
                vec![
                    vec![SqlValue::Int(7), SqlValue::Int(7), "Linden".into()],
                    vec![SqlValue::Int(8), SqlValue::Int(8), "Eichen".into()],
                ],
            );
        let provider = start_with(config, &PoolRegistry::new(), &client, 2).unwrap();

        let collection = provider
            .get_feature_collection(&FeatureQuery::of("kita").and("schule"))
            .await
            .unwrap();

        assert_eq!(collection.number_matched, Some(4));
        assert_eq!(collection.number_returned, 4);
        let names: Vec<&str> = collection
            .features
            .iter()
            .map(|feature| feature["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Sonne", "Mond", "Linden", "Eichen"]);
    }

    #[test]
    fn test_config_types() {
        assert_eq!(config().types.len(), 1);
    }
}
