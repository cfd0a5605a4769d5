//! Pool sizing guard and shared pools

#[cfg(test)]
mod pool_sizing_tests {
    use featurestore_sql::connector::{MemorySqlClient, PoolRegistry};
    use featurestore_sql::ProviderError;
    use tokio_test::{assert_err, assert_ok};

    use crate::common::{config, start_with};

    #[test]
    fn test_too_few_connections() {
        let mut config = config();
        config.connection_info.pool.max_connections = 1;

        let error = assert_err!(start_with(config, &PoolRegistry::new(), &MemorySqlClient::new(), 4));
        assert!(matches!(
            error,
            ProviderError::TooFewConnections {
                max_connections: 1,
                min_required: 2
            }
        ));
        assert_eq!(
            error.to_string(),
            "maxConnections=1 is too low, a minimum of 2 is required"
        );
    }

    #[test]
    fn test_capacity_is_bounded_by_connections() {
        // 4 connections, 2 queries per feature type
        let provider = start_with(config(), &PoolRegistry::new(), &MemorySqlClient::new(), 8).unwrap();
        assert_eq!(provider.max_queries(), 2);
        assert_eq!(provider.capacity(), 2);
    }

    #[test]
    fn test_dynamic_pool_scales_with_parallelism() {
        let mut config = config();
        config.connection_info.pool.max_connections = -1;

        let provider = start_with(config, &PoolRegistry::new(), &MemorySqlClient::new(), 3).unwrap();
        assert_eq!(provider.connection_info().pool.max_connections, 6);
        assert_eq!(provider.capacity(), 3);
    }

    #[test]
    fn test_shared_pool_parameters_must_match() {
        let registry = PoolRegistry::new();
        let mut first = config();
        first.connection_info.pool.shared = true;
        let mut second = first.clone();
        second.id = "kitas_2".to_string();

        assert_ok!(start_with(first.clone(), &registry, &MemorySqlClient::new(), 2));
        assert_ok!(start_with(second.clone(), &registry, &MemorySqlClient::new(), 2));

        second.connection_info.pool.max_connections = 8;
        let error = assert_err!(start_with(second, &registry, &MemorySqlClient::new(), 2));
        assert!(matches!(error, ProviderError::PoolMismatch(_)));
        assert!(error.to_string().contains("maxConnections"));
    }
}
