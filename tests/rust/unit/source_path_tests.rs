//! Source path parsing and relation extraction edge cases

#[cfg(test)]
mod source_path_tests {
    use featurestore_sql::config::SourcePathDefaults;
    use featurestore_sql::sql_path::{Cardinality, PathParseError, SqlPathParser};
    use test_case::test_case;

    fn parser() -> SqlPathParser {
        SqlPathParser::new(&SourcePathDefaults::default(), vec!["JSON"]).unwrap()
    }

    #[test_case("/kita/[id=fk]" ; "missing joined table")]
    #[test_case("/kita{sortKey=id" ; "unterminated flag")]
    fn test_invalid_table_paths_are_reported_verbatim(path: &str) {
        let err = parser().parse_table_path(path).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid sourcePath in provider configuration: {}", path)
        );
    }

    #[test]
    fn test_unknown_connector_is_rejected() {
        let err = parser().parse_column_path("[XML]doc/a").unwrap_err();
        assert!(matches!(err, PathParseError::UnknownConnector { .. }));
    }

    #[test]
    fn test_connected_column() {
        let path = parser().parse_column_path("[JSON]details/adresse/ort").unwrap();
        assert!(path.is_connected());
        assert_eq!(path.connector.as_deref(), Some("JSON"));
        assert_eq!(path.path_in_connector.as_deref(), Some("adresse.ort"));
    }

    #[test]
    fn test_relations_of_nested_paths() {
        let parser = parser();
        let root = parser.parse_table_path("/kita").unwrap();

        let one_to_n = parser
            .parse_column_path("[id=kita_fk]plaetze/anzahl")
            .unwrap();
        let relations = parser.extract_relations(&root, &one_to_n).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].cardinality, Cardinality::OneToN);
        assert_eq!(relations[0].source_field, "id");
        assert_eq!(relations[0].target_field, "kita_fk");

        let m_to_n = parser
            .parse_table_path("[id=kita_id]kita_2_angebot/[angebot_id=id]angebot")
            .unwrap();
        let relations = parser.extract_relations(&root, &m_to_n).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].cardinality, Cardinality::MToN);
        assert_eq!(relations[0].target_container, "angebot");
        let junction = relations[0].junction.as_ref().unwrap();
        assert_eq!(junction.source_field, "kita_id");
        assert_eq!(junction.target_field, "angebot_id");
    }

    #[test]
    fn test_full_path_parses_back() {
        let parser = parser();
        let parsed = parser
            .parse_table_path("/kita{sortKey=oid}/[oid=kita_fk]plaetze{filter=anzahl>0}")
            .unwrap();
        assert_eq!(parser.parse_table_path(&parsed.full_path()).unwrap(), parsed);
    }
}
