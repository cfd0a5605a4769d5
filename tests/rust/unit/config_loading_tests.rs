//! Provider configuration loading from YAML files

#[cfg(test)]
mod config_loading_tests {
    use std::io::Write;

    use featurestore_sql::config::{ConfigError, Dialect, ProviderConfig};
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
id: bildung
connectionInfo:
  dialect: GPKG
  database: bildung.gpkg
  triggers:
    onDelete:
      - DELETE FROM audit WHERE fid={{id}}
queryGeneration:
  chunkSize: 500
  computeNumberSkipped: true
types:
  schule:
    sourcePath: /schule
    type: OBJECT
    properties:
      id:
        sourcePath: id
        type: INTEGER
        role: ID
  kita:
    sourcePath: /kita
    type: OBJECT
    properties:
      id:
        sourcePath: id
        type: INTEGER
        role: ID
"#;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write(CONFIG);
        let config = ProviderConfig::from_yaml_file(file.path()).unwrap();

        assert_eq!(config.id, "bildung");
        assert_eq!(config.connection_info.dialect, Dialect::Gpkg);
        assert_eq!(config.query_generation.chunk_size, 500);
        assert!(config.query_generation.compute_number_skipped);
        assert_eq!(
            config.connection_info.triggers.on_delete_for("3"),
            vec!["DELETE FROM audit WHERE fid=3".to_string()]
        );
    }

    #[test]
    fn test_type_order_is_preserved() {
        let config = ProviderConfig::from_yaml_str(CONFIG).unwrap();
        let names: Vec<&str> = config.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["schule", "kita"]);
        assert!(config.feature_type("kita").is_some());
        assert!(config.feature_type("hort").is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = ProviderConfig::from_yaml_file("/nonexistent/provider.yml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_chunk_size_is_validated() {
        let invalid = CONFIG.replace("chunkSize: 500", "chunkSize: 0");
        let result = ProviderConfig::from_yaml_str(&invalid);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_database_is_rejected() {
        let invalid = CONFIG.replace("database: bildung.gpkg", "database: ''");
        assert!(ProviderConfig::from_yaml_str(&invalid).is_err());
    }
}
