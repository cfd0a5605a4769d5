//! Mutations through the provider, one transaction per feature

#[cfg(test)]
mod mutation_tests {
    use featurestore_sql::connector::{MemorySqlClient, SqlValue};
    use featurestore_sql::decoder::FeatureEvent;
    use featurestore_sql::mutation::{FeatureSql, MutationType};
    use featurestore_sql::schema::SchemaType;
    use serde_json::json;

    use crate::common::start;

    fn name_path() -> Vec<String> {
        vec!["name".to_string()]
    }

    #[tokio::test]
    async fn test_create_with_children() {
        let client = MemorySqlClient::new();
        client.on("INSERT INTO kita ", vec![vec![SqlValue::Int(5)]]);
        let provider = start(&client);

        let feature =
            FeatureSql::from_json(json!({"name": "Neu", "plaetze": [{"anzahl": 3}]})).unwrap();
        let result = provider.create_features("kita", vec![feature]).await.unwrap();

        assert!(result.is_ok());
        assert_eq!(result.mutation_type, MutationType::Create);
        assert_eq!(result.ids, vec!["5".to_string()]);

        let transactions = client.transactions();
        assert_eq!(transactions.len(), 1);
        assert!(transactions[0].committed);
        assert_eq!(
            transactions[0].statements,
            vec![
                "INSERT INTO kita (name) VALUES ('Neu') RETURNING id",
                "INSERT INTO plaetze (anzahl,kita_fk) VALUES (3,5) RETURNING id",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_from_events() {
        let client = MemorySqlClient::new();
        client.on("INSERT INTO kita ", vec![vec![SqlValue::Int(6)]]);
        let provider = start(&client);

        let events = vec![
            FeatureEvent::feature_start("kita"),
            FeatureEvent::value(&name_path(), "Sonne", SchemaType::String),
            FeatureEvent::FeatureEnd,
        ];
        let result = provider.create_features_from_events("kita", events).await.unwrap();

        assert_eq!(result.ids, vec!["6".to_string()]);
        assert_eq!(
            client.transactions()[0].statements,
            vec!["INSERT INTO kita (name) VALUES ('Sonne') RETURNING id"]
        );
    }

    #[tokio::test]
    async fn test_partial_update_sets_null() {
        let client = MemorySqlClient::new();
        let provider = start(&client);

        let events = vec![
            FeatureEvent::feature_start("kita"),
            FeatureEvent::Null { path: name_path() },
            FeatureEvent::FeatureEnd,
        ];
        let result = provider.update_feature("kita", "7", events, true).await.unwrap();

        assert!(result.is_ok());
        assert_eq!(result.mutation_type, MutationType::Update);
        assert_eq!(
            client.transactions()[0].statements,
            vec!["UPDATE kita SET name=NULL WHERE id=7"]
        );
    }

    #[tokio::test]
    async fn test_replace_without_feature_fails() {
        let client = MemorySqlClient::new();
        let provider = start(&client);

        let result = provider.update_feature("kita", "7", vec![], false).await.unwrap();

        assert!(!result.is_ok());
        assert_eq!(result.mutation_type, MutationType::Replace);
        assert!(client.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_delete_runs_triggers_and_drops_cached_stats() {
        let client = MemorySqlClient::new();
        client
            .on("SELECT count(*) FROM kita", vec![vec![SqlValue::Int(3)]])
            .on("DELETE FROM kita ", vec![vec![SqlValue::Int(7)]]);
        let provider = start(&client);

        assert_eq!(provider.count("kita").await.unwrap(), 3);
        assert!(!provider.stats_cache().is_empty());

        let result = provider.delete_feature("kita", "7").await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.ids, vec!["7".to_string()]);
        assert_eq!(
            client.transactions()[0].statements,
            vec![
                "DELETE FROM kita WHERE id=7 RETURNING id",
                "DELETE FROM kita_log WHERE kita_id=7",
            ]
        );
        assert!(provider.stats_cache().is_empty());
    }
}
