//! SQL feature provider
//!
//! Derives relational schemas and query templates of all feature types once
//! at startup, sizes the connection pool and then serves feature streams,
//! mutations and aggregate statistics.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::cache::{StatsCache, StatsKind};
use crate::config::{ConfigError, ConnectionInfo, ProviderConfig};
use crate::connector::{
    PoolHandle, PoolMismatch, PoolRegistry, QueryBatch, QuerySet, SqlClient, SqlConnector, SqlError,
    SqlValue,
};
use crate::decoder::{collect_features, decode_stream, DecoderError, FeatureCollection, FeatureEvent};
use crate::dialect::{BoundingBox, SqlDialect, TemporalExtent};
use crate::filter::{CqlFilter, EncodingContext, FilterError};
use crate::mutation::{
    reduce_patches, FeatureEncoderSql, FeatureSql, MutationError, MutationExecutor, MutationResult,
    MutationType,
};
use crate::query::{
    MetaQueryParams, QueryError, QueryTemplateDeriver, Queryables, SqlQueryTemplates, StatsQueries,
};
use crate::schema::{
    apply_scope, ColumnSql, FeatureSchema, Role, SchemaDeriver, SchemaError, SchemaSql, Scope,
};
use crate::sql_path::{PathParseError, SqlPathParser};

pub type FeatureStream = BoxStream<'static, Result<FeatureEvent, DecoderError>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("maxConnections={max_connections} is too low, a minimum of {min_required} is required")]
    TooFewConnections {
        max_connections: i32,
        min_required: usize,
    },
    #[error("Shared connection pool: {0}")]
    PoolMismatch(#[from] PoolMismatch),
    #[error("Feature type `{type_name}` not found")]
    UnknownType { type_name: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Path(#[from] PathParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Decoder(#[from] DecoderError),
}

/// Query of one feature type inside a [`FeatureQuery`]
#[derive(Debug, Clone, PartialEq)]
pub struct TypeQuery {
    pub type_name: String,
    /// CQL2 text
    pub filter: Option<String>,
}

/// Paged query over one or more feature types, features of all types are
/// returned in one stream ordered by their sort keys
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub types: Vec<TypeQuery>,
    /// `0` means unlimited
    pub limit: u64,
    pub offset: u64,
}

impl FeatureQuery {
    pub fn of(type_name: &str) -> Self {
        FeatureQuery {
            types: vec![TypeQuery {
                type_name: type_name.to_string(),
                filter: None,
            }],
            limit: 0,
            offset: 0,
        }
    }

    pub fn and(mut self, type_name: &str) -> Self {
        self.types.push(TypeQuery {
            type_name: type_name.to_string(),
            filter: None,
        });
        self
    }

    /// Filter of the most recently added type
    pub fn with_filter(mut self, filter: &str) -> Self {
        if let Some(last) = self.types.last_mut() {
            last.filter = Some(filter.to_string());
        }
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Everything derived for one feature type at startup
#[derive(Debug)]
struct FeatureTypeSql {
    schema: FeatureSchema,
    root: SchemaSql,
    templates: Arc<SqlQueryTemplates>,
    queryables: Queryables,
}

#[derive(Debug)]
pub struct FeatureProviderSql {
    config: ProviderConfig,
    connection_info: ConnectionInfo,
    content_hash: String,
    dialect: Arc<dyn SqlDialect>,
    parser: SqlPathParser,
    types: Vec<(String, FeatureTypeSql)>,
    connector: SqlConnector,
    executor: MutationExecutor,
    stats: StatsQueries,
    stats_cache: StatsCache,
    max_queries: usize,
    runners: Arc<Semaphore>,
    capacity: usize,
}

impl FeatureProviderSql {
    /// Start with the number of available CPUs as stream parallelism
    pub fn start<F>(config: ProviderConfig, registry: &PoolRegistry, create_client: F) -> Result<Self, ProviderError>
    where
        F: FnOnce(&ConnectionInfo) -> Arc<dyn SqlClient>,
    {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::start_with_parallelism(config, registry, create_client, parallelism)
    }

    pub fn start_with_parallelism<F>(
        config: ProviderConfig,
        registry: &PoolRegistry,
        create_client: F,
        parallelism: usize,
    ) -> Result<Self, ProviderError>
    where
        F: FnOnce(&ConnectionInfo) -> Arc<dyn SqlClient>,
    {
        let dialect = crate::dialect::for_dialect(config.connection_info.dialect);
        let parser = SqlPathParser::new(&config.source_path_defaults, Vec::<String>::new())?;
        let template_deriver = QueryTemplateDeriver::new(dialect.clone(), config.query_generation.clone());

        let mut types = Vec::with_capacity(config.types.len());
        for schema in &config.types {
            let derived = derive_type(schema, &parser, &template_deriver, dialect.clone())?;
            debug!(
                "Feature type {}: {} tables, {} value queries",
                schema.name,
                derived.root.nodes().len(),
                derived.templates.values.len()
            );
            types.push((schema.name.clone(), derived));
        }

        let max_queries = types
            .iter()
            .map(|(_, derived)| derived.templates.max_queries())
            .max()
            .unwrap_or(1)
            .max(1);

        let connection_info = config
            .connection_info
            .with_effective_pool(max_queries, parallelism.max(1));
        let max_connections = connection_info.pool.max_connections;

        let capacity = parallelism
            .max(1)
            .min(max_connections.max(0) as usize / max_queries);
        if capacity == 0 {
            return Err(ProviderError::TooFewConnections {
                max_connections,
                min_required: max_queries,
            });
        }

        info!(
            "Provider {}: {} feature types, {} tables, maxQueriesPerFeatureType={}",
            config.id,
            types.len(),
            types.iter().map(|(_, t)| t.root.nodes().len()).sum::<usize>(),
            max_queries
        );
        info!(
            "Provider {}: maxConnections={}, recommended {} for {} parallel streams, capacity={}",
            config.id,
            max_connections,
            max_queries * parallelism.max(1),
            parallelism.max(1),
            capacity
        );

        let pool: PoolHandle = registry.get_or_create(&connection_info, || create_client(&connection_info))?;
        let content_hash = config.content_hash()?;

        Ok(FeatureProviderSql {
            connector: SqlConnector::new(pool.clone()),
            executor: MutationExecutor::new(
                pool,
                dialect.clone(),
                connection_info.triggers.clone(),
            ),
            stats: StatsQueries::new(dialect.clone()),
            stats_cache: StatsCache::new(),
            runners: Arc::new(Semaphore::new(capacity)),
            config,
            connection_info,
            content_hash,
            dialect,
            parser,
            types,
            max_queries,
            capacity,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Connection settings after pool sizing
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    pub fn max_queries(&self) -> usize {
        self.max_queries
    }

    /// Number of feature streams served concurrently
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn relational_schema(&self, type_name: &str) -> Result<&SchemaSql, ProviderError> {
        Ok(&self.feature_type(type_name)?.root)
    }

    pub fn query_templates(&self, type_name: &str) -> Result<Arc<SqlQueryTemplates>, ProviderError> {
        Ok(self.feature_type(type_name)?.templates.clone())
    }

    pub fn stats_cache(&self) -> &StatsCache {
        &self.stats_cache
    }

    fn feature_type(&self, type_name: &str) -> Result<&FeatureTypeSql, ProviderError> {
        self.types
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, derived)| derived)
            .ok_or_else(|| ProviderError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    fn encode_filter(&self, derived: &FeatureTypeSql, filter: &str) -> Result<String, ProviderError> {
        let context = EncodingContext::new(&derived.queryables, self.dialect.as_ref())
            .with_collation(self.config.query_generation.accenti_collation.as_deref());
        Ok(CqlFilter::parse(filter)?.to_sql(&context)?)
    }

    fn query_batch(&self, query: &FeatureQuery) -> Result<QueryBatch, ProviderError> {
        let mut sets = Vec::with_capacity(query.types.len());
        for type_query in &query.types {
            let derived = self.feature_type(&type_query.type_name)?;
            let filter = type_query
                .filter
                .as_deref()
                .map(|filter| self.encode_filter(derived, filter))
                .transpose()?;
            sets.push(QuerySet {
                templates: derived.templates.clone(),
                filter,
            });
        }

        Ok(QueryBatch {
            limit: query.limit,
            offset: query.offset,
            chunk_size: u64::from(self.config.query_generation.chunk_size.max(1)),
            sets,
            with_number_skipped: self.config.query_generation.compute_number_skipped,
        })
    }

    /// SQL of the first chunk of `query`; value queries carry the
    /// placeholders `:minKey` and `:maxKey` for the keyset window
    pub fn explain(&self, query: &FeatureQuery) -> Result<Vec<String>, ProviderError> {
        let batch = self.query_batch(query)?;
        let limit = match batch.limit {
            0 => batch.chunk_size,
            limit => limit.min(batch.chunk_size),
        };
        let (min_key, max_key) = (SqlValue::from(":minKey"), SqlValue::from(":maxKey"));

        let mut statements = Vec::new();
        for set in &batch.sets {
            statements.push(set.templates.meta.generate(&MetaQueryParams {
                limit,
                offset: batch.offset,
                after: None,
                filter: set.filter.as_deref(),
                with_number_skipped: batch.with_number_skipped,
            }));
            statements.extend(
                set.templates
                    .values
                    .iter()
                    .map(|value| value.generate(&min_key, &max_key, set.filter.as_deref())),
            );
        }
        Ok(statements)
    }

    /// Stream of feature events. The stream holds one of the `capacity`
    /// runner permits until it is dropped.
    pub async fn get_features(&self, query: &FeatureQuery) -> Result<FeatureStream, ProviderError> {
        let batch = self.query_batch(query)?;

        let permit = self
            .runners
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SqlError::Closed)?;

        Ok(decode_stream(self.connector.source_stream(batch))
            .map(move |event| {
                let _held = &permit;
                event
            })
            .boxed())
    }

    pub async fn get_feature_collection(&self, query: &FeatureQuery) -> Result<FeatureCollection, ProviderError> {
        let events = self.get_features(query).await?;
        Ok(collect_features(events).await?)
    }

    /// Relational schema of the receivable properties, derived per mutation
    fn mutation_schema(&self, type_name: &str) -> Result<SchemaSql, ProviderError> {
        let schema = &self.feature_type(type_name)?.schema;
        let receivable = apply_scope(schema, Scope::Receivable);
        if receivable.properties.is_empty() {
            return Err(SchemaError::EmptyMutationSchema {
                type_name: type_name.to_string(),
            }
            .into());
        }
        first_root(type_name, SchemaDeriver::new(&self.parser).derive(&receivable)?)
    }

    pub async fn create_features(
        &self,
        type_name: &str,
        features: Vec<FeatureSql>,
    ) -> Result<MutationResult, ProviderError> {
        let root = self.mutation_schema(type_name)?;
        let result = self.executor.create(&root, features).await;
        self.after_mutation(type_name, &result);
        Ok(result)
    }

    /// Create from a token stream with one `FeatureStart`/`FeatureEnd` pair per feature
    pub async fn create_features_from_events(
        &self,
        type_name: &str,
        events: Vec<FeatureEvent>,
    ) -> Result<MutationResult, ProviderError> {
        let features = FeatureEncoderSql::new(false).encode(events);
        self.create_features(type_name, features).await
    }

    /// Replace the feature `id`, or patch it when `partial` is set. Patch
    /// input may carry `PATCH_NULL_VALUE` to clear a property.
    pub async fn update_feature(
        &self,
        type_name: &str,
        id: &str,
        events: Vec<FeatureEvent>,
        partial: bool,
    ) -> Result<MutationResult, ProviderError> {
        let root = self.mutation_schema(type_name)?;
        let features = FeatureEncoderSql::new(partial).encode(events);

        let result = if partial {
            self.executor.update(&root, id, reduce_patches(features)).await
        } else {
            match features.into_iter().next() {
                Some(feature) => self.executor.replace(&root, id, feature).await,
                None => MutationResult::failed(
                    MutationType::Replace,
                    MutationError::Input {
                        message: "no feature in input".to_string(),
                    },
                ),
            }
        };
        self.after_mutation(type_name, &result);
        Ok(result)
    }

    pub async fn delete_feature(&self, type_name: &str, id: &str) -> Result<MutationResult, ProviderError> {
        let root = self.mutation_schema(type_name)?;
        let result = self.executor.delete(&root, id).await;
        self.after_mutation(type_name, &result);
        Ok(result)
    }

    fn after_mutation(&self, type_name: &str, result: &MutationResult) {
        match &result.error {
            None => {
                debug!("{:?} of {} succeeded: {:?}", result.mutation_type, type_name, result.ids);
                self.stats_cache.invalidate(type_name);
            }
            Some(e) => warn!("{:?} of {} failed: {}", result.mutation_type, type_name, e),
        }
    }

    /// Number of features, `-1` when the query fails
    pub async fn count(&self, type_name: &str) -> Result<i64, ProviderError> {
        let derived = self.feature_type(type_name)?;
        if let Some(count) = self.stats_cache.get(type_name, StatsKind::Count, &self.content_hash) {
            return Ok(count);
        }

        let sql = self.stats.count(&derived.root);
        match self.single_row(&sql).await.map(|row| row.first().and_then(SqlValue::as_i64)) {
            Ok(Some(count)) => {
                self.stats_cache
                    .put(type_name, StatsKind::Count, &self.content_hash, &count);
                Ok(count)
            }
            Ok(None) => {
                warn!("Could not compute number of features of {}: empty result", type_name);
                Ok(-1)
            }
            Err(e) => {
                warn!("Could not compute number of features of {}: {}", type_name, e);
                Ok(-1)
            }
        }
    }

    /// Extent of the primary geometry, `None` without a geometry or when the query fails
    pub async fn spatial_extent(&self, type_name: &str) -> Result<Option<BoundingBox>, ProviderError> {
        let derived = self.feature_type(type_name)?;
        let Some((node, column)) = primary_geometry(&derived.root) else {
            return Ok(None);
        };
        if let Some(extent) = self.stats_cache.get(type_name, StatsKind::Spatial, &self.content_hash) {
            return Ok(Some(extent));
        }

        let extent = match self.stats.spatial_extent(&derived.root, node, column, false) {
            Ok(sql) => self.single_row(&sql).await.map(|row| {
                row.first()
                    .and_then(SqlValue::as_str)
                    .and_then(|text| self.dialect.parse_extent(text))
            }),
            Err(e) => {
                warn!("Could not compute spatial extent of {}: {}", type_name, e);
                return Ok(None);
            }
        };

        match extent {
            Ok(Some(extent)) => {
                self.stats_cache
                    .put(type_name, StatsKind::Spatial, &self.content_hash, &extent);
                Ok(Some(extent))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Could not compute spatial extent of {}: {}", type_name, e);
                Ok(None)
            }
        }
    }

    /// Extent of the primary instant or interval, `None` when the type has
    /// neither or the query fails
    pub async fn temporal_extent(&self, type_name: &str) -> Result<Option<TemporalExtent>, ProviderError> {
        let derived = self.feature_type(type_name)?;
        let Some((node, start, end)) = primary_temporal(&derived.root) else {
            return Ok(None);
        };
        if let Some(extent) = self.stats_cache.get(type_name, StatsKind::Temporal, &self.content_hash) {
            return Ok(Some(extent));
        }

        let sql = match self.stats.temporal_extent(&derived.root, node, start, end) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Could not compute temporal extent of {}: {}", type_name, e);
                return Ok(None);
            }
        };

        let extent = match self.single_row(&sql).await {
            Ok(row) => {
                let open_end = self.dialect.apply_to_instant_max();
                let start = row.first().and_then(SqlValue::as_str);
                let end = row
                    .get(1)
                    .and_then(SqlValue::as_str)
                    .filter(|end| *end != open_end);
                self.dialect
                    .parse_temporal_extent(start, end)
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match extent {
            Ok(Some(extent)) => {
                self.stats_cache
                    .put(type_name, StatsKind::Temporal, &self.content_hash, &extent);
                Ok(Some(extent))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Could not compute temporal extent of {}: {}", type_name, e);
                Ok(None)
            }
        }
    }

    async fn single_row(&self, sql: &str) -> Result<Vec<SqlValue>, SqlError> {
        debug!("Stats query: {}", sql);
        Ok(self
            .connector
            .pool()
            .query(sql)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Dataset change notification
    pub fn on_dataset_change(&self, type_name: &str) {
        info!("Dataset of {} changed, dropping cached statistics", type_name);
        self.stats_cache.invalidate(type_name);
    }
}

fn derive_type(
    schema: &FeatureSchema,
    parser: &SqlPathParser,
    template_deriver: &QueryTemplateDeriver,
    dialect: Arc<dyn SqlDialect>,
) -> Result<FeatureTypeSql, ProviderError> {
    let deriver = SchemaDeriver::new(parser);

    let returnable = apply_scope(schema, Scope::Returnable);
    let root = first_root(&schema.name, deriver.derive(&returnable)?)?;
    let templates = template_deriver.derive(&schema.name, &root)?;

    let queryable = apply_scope(schema, Scope::Queryable);
    let queryables = Queryables::new(first_root(&schema.name, deriver.derive(&queryable)?)?, dialect);

    Ok(FeatureTypeSql {
        schema: schema.clone(),
        root,
        templates: Arc::new(templates),
        queryables,
    })
}

fn first_root(type_name: &str, roots: Vec<SchemaSql>) -> Result<SchemaSql, ProviderError> {
    roots.into_iter().next().ok_or_else(|| {
        SchemaError::InvalidRoot {
            type_name: type_name.to_string(),
            path: String::new(),
        }
        .into()
    })
}

fn primary_geometry(root: &SchemaSql) -> Option<(&SchemaSql, &ColumnSql)> {
    let nodes = root.nodes();
    let by_role = nodes.iter().copied().find_map(|node| {
        node.columns
            .iter()
            .find(|column| column.role == Some(Role::PrimaryGeometry))
            .map(|column| (node, column))
    });
    by_role.or_else(|| {
        nodes.iter().copied().find_map(|node| {
            node.columns
                .iter()
                .find(|column| column.is_spatial() && !column.is_constant())
                .map(|column| (node, column))
        })
    })
}

/// Instant column, or the interval start with its end when both live in the same table
fn primary_temporal(root: &SchemaSql) -> Option<(&SchemaSql, &ColumnSql, Option<&ColumnSql>)> {
    let nodes = root.nodes();
    let with_role = |role: Role| {
        nodes.iter().copied().find_map(|node| {
            node.columns
                .iter()
                .find(|column| column.role == Some(role))
                .map(|column| (node, column))
        })
    };

    if let Some((node, instant)) = with_role(Role::PrimaryInstant) {
        return Some((node, instant, None));
    }

    let (node, start) = with_role(Role::PrimaryIntervalStart)?;
    let end = with_role(Role::PrimaryIntervalEnd)
        .filter(|(end_node, _)| end_node.path == node.path)
        .map(|(_, end)| end);
    Some((node, start, end))
}
