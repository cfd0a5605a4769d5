use std::sync::Arc;

use featurestore_sql::config::ProviderConfig;
use featurestore_sql::connector::{MemorySqlClient, PoolRegistry, SqlClient, SqlValue};
use featurestore_sql::{FeatureProviderSql, ProviderError};

pub const KITAS: &str = r#"
id: kitas
connectionInfo:
  dialect: PGIS
  database: kitas
  pool:
    maxConnections: 4
  triggers:
    onDelete:
      - DELETE FROM kita_log WHERE kita_id={{id}}
types:
  kita:
    sourcePath: /kita
    type: OBJECT
    properties:
      id:
        sourcePath: id
        type: INTEGER
        role: ID
      name:
        sourcePath: name
        type: STRING
      plaetze:
        sourcePath: '[id=kita_fk]plaetze{filter=anzahl IS NOT NULL AND anzahl>0}'
        type: OBJECT_ARRAY
        properties:
          anzahl:
            sourcePath: anzahl
            type: INTEGER
"#;

pub fn config() -> ProviderConfig {
    ProviderConfig::from_yaml_str(KITAS).unwrap()
}

pub fn start_with(
    config: ProviderConfig,
    registry: &PoolRegistry,
    client: &MemorySqlClient,
    parallelism: usize,
) -> Result<FeatureProviderSql, ProviderError> {
    let client: Arc<dyn SqlClient> = Arc::new(client.clone());
    FeatureProviderSql::start_with_parallelism(config, registry, move |_| client, parallelism)
}

pub fn start(client: &MemorySqlClient) -> FeatureProviderSql {
    start_with(config(), &PoolRegistry::new(), client, 2).unwrap()
}

/// Meta row `minKey, maxKey, numberReturned, numberMatched, numberSkipped`
pub fn meta(min: i64, max: i64, returned: i64, matched: i64) -> Vec<SqlValue> {
    vec![
        SqlValue::Int(min),
        SqlValue::Int(max),
        SqlValue::Int(returned),
        SqlValue::Int(matched),
        SqlValue::Int(-1),
    ]
}
