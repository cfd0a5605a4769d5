//! Mutation executor
//!
//! Each feature is written in its own transaction. Rows are inserted parent
//! first since child rows reference keys returned by their parents.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::errors::MutationError;
use super::feature_sql::{is_patch_null, lookup, FeatureSql};
use crate::config::Triggers;
use crate::connector::{PoolHandle, PooledTransaction, SqlValue};
use crate::dialect::SqlDialect;
use crate::query::mutation as statements;
use crate::schema::{ColumnSource, ColumnSql, Container, Role, SchemaSql, SchemaType};
use crate::sql_path::SqlRelation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationType {
    Create,
    Replace,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub mutation_type: MutationType,
    /// Ids of the features written or deleted
    pub ids: Vec<String>,
    pub error: Option<MutationError>,
}

impl MutationResult {
    fn new(mutation_type: MutationType) -> Self {
        MutationResult {
            mutation_type,
            ids: vec![],
            error: None,
        }
    }

    fn from_outcome(mutation_type: MutationType, outcome: Result<Vec<String>, MutationError>) -> Self {
        let mut result = MutationResult::new(mutation_type);
        match outcome {
            Ok(ids) => result.ids = ids,
            Err(e) => result.error = Some(e),
        }
        result
    }

    pub(crate) fn failed(mutation_type: MutationType, error: MutationError) -> Self {
        MutationResult::from_outcome(mutation_type, Err(error))
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A row written in the current transaction
#[derive(Debug, Clone, Default)]
struct WrittenRow {
    returned: Option<(String, SqlValue)>,
    values: Vec<(String, String)>,
}

impl WrittenRow {
    fn literal(&self, column: &str, dialect: &dyn SqlDialect) -> Option<String> {
        match &self.returned {
            Some((name, value)) if name == column && !value.is_null() => {
                Some(value.to_sql_literal(dialect))
            }
            _ => self
                .values
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, literal)| literal.clone()),
        }
    }
}

/// The relation leading from `parent` to `node`
fn direct_relation<'a>(parent: &SchemaSql, node: &'a SchemaSql) -> Result<&'a SqlRelation, MutationError> {
    if node.relations.len() != parent.relations.len() + 1 {
        return Err(MutationError::unsupported(
            node.name(),
            "only directly joined tables can be written",
        ));
    }
    Ok(&node.relations[parent.relations.len()])
}

/// A 1:1 relation where the parent holds the foreign key
fn foreign_key_in_parent(relation: &SqlRelation) -> bool {
    relation.is_one_2_one() && relation.source_field != relation.source_sort_key
}

pub(crate) fn id_column(root: &SchemaSql) -> Result<&ColumnSql, MutationError> {
    root.columns
        .iter()
        .find(|column| column.role == Some(Role::Id))
        .ok_or_else(|| MutationError::MissingId {
            table: root.name().to_string(),
        })
}

pub(crate) fn id_literal(column: &ColumnSql, id: &str, dialect: &dyn SqlDialect) -> String {
    if column.schema_type.is_numeric() && id.parse::<f64>().is_ok() {
        id.to_string()
    } else {
        format!("'{}'", dialect.escape_string(id))
    }
}

/// Wraps `value` into objects along `path`
fn nest(path: &[String], value: JsonValue) -> Map<String, JsonValue> {
    let mut object = Map::new();
    if let Some((last, parents)) = path.split_last() {
        object.insert(last.clone(), value);
        for parent in parents.iter().rev() {
            let mut outer = Map::new();
            outer.insert(parent.clone(), JsonValue::Object(object));
            object = outer;
        }
    }
    object
}

fn relative<'a>(path: &'a [String], object_path: &[String]) -> &'a [String] {
    &path[object_path.len().min(path.len())..]
}

#[derive(Debug, Clone)]
pub struct MutationExecutor {
    pool: PoolHandle,
    dialect: Arc<dyn SqlDialect>,
    triggers: Triggers,
}

impl MutationExecutor {
    pub fn new(pool: PoolHandle, dialect: Arc<dyn SqlDialect>, triggers: Triggers) -> Self {
        MutationExecutor {
            pool,
            dialect,
            triggers,
        }
    }

    /// Inserts the features one transaction each, stopping at the first failure
    pub async fn create(&self, root: &SchemaSql, features: Vec<FeatureSql>) -> MutationResult {
        let mut result = MutationResult::new(MutationType::Create);
        for feature in features {
            let outcome = match self.pool.begin().await {
                Ok(mut tx) => {
                    let written = self
                        .insert_node(&mut tx, root, &feature.properties, None, None)
                        .await
                        .map(|row| {
                            row.returned
                                .map(|(_, value)| value.to_string())
                                .into_iter()
                                .collect()
                        });
                    self.finish(tx, written).await
                }
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(ids) => result.ids.extend(ids),
                Err(e) => {
                    result.error = Some(e);
                    break;
                }
            }
        }
        result
    }

    /// Deletes the feature and inserts it again with the same id
    pub async fn replace(&self, root: &SchemaSql, id: &str, feature: FeatureSql) -> MutationResult {
        let outcome = match self.pool.begin().await {
            Ok(mut tx) => {
                let written = self.replace_in(&mut tx, root, id, &feature).await;
                self.finish(tx, written).await
            }
            Err(e) => Err(e.into()),
        };
        MutationResult::from_outcome(MutationType::Replace, outcome)
    }

    /// Applies a patch: set values are updated, explicit nulls cleared,
    /// omitted properties kept. Nested collections present in the patch
    /// replace the stored ones.
    pub async fn update(&self, root: &SchemaSql, id: &str, patch: FeatureSql) -> MutationResult {
        let outcome = match self.pool.begin().await {
            Ok(mut tx) => {
                let written = self
                    .apply_patch(&mut tx, root, id, &patch.properties)
                    .await
                    .map(|()| vec![id.to_string()]);
                self.finish(tx, written).await
            }
            Err(e) => Err(e.into()),
        };
        MutationResult::from_outcome(MutationType::Update, outcome)
    }

    /// Deletes the feature, then runs the delete triggers
    pub async fn delete(&self, root: &SchemaSql, id: &str) -> MutationResult {
        let outcome = match self.pool.begin().await {
            Ok(mut tx) => {
                let deleted = self.delete_in(&mut tx, root, id).await;
                self.finish(tx, deleted).await
            }
            Err(e) => Err(e.into()),
        };
        MutationResult::from_outcome(MutationType::Delete, outcome)
    }

    /// Commits on success, rolls back otherwise
    async fn finish(
        &self,
        tx: PooledTransaction,
        outcome: Result<Vec<String>, MutationError>,
    ) -> Result<Vec<String>, MutationError> {
        match outcome {
            Ok(ids) => {
                tx.commit().await?;
                debug!("Committed mutation of {:?}", ids);
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn replace_in(
        &self,
        tx: &mut PooledTransaction,
        root: &SchemaSql,
        id: &str,
        feature: &FeatureSql,
    ) -> Result<Vec<String>, MutationError> {
        let id_column = id_column(root)?;
        let id_value = id_literal(id_column, id, self.dialect.as_ref());
        tx.execute(&statements::delete(root.name(), &id_column.name, &id_value))
            .await?;
        self.insert_node(tx, root, &feature.properties, None, Some(id))
            .await?;
        Ok(vec![id.to_string()])
    }

    async fn delete_in(
        &self,
        tx: &mut PooledTransaction,
        root: &SchemaSql,
        id: &str,
    ) -> Result<Vec<String>, MutationError> {
        let id_column = id_column(root)?;
        let id_value = id_literal(id_column, id, self.dialect.as_ref());
        let rows = tx
            .execute(&statements::delete(root.name(), &id_column.name, &id_value))
            .await?;
        for trigger in self.triggers.on_delete_for(id) {
            tx.execute(&trigger).await?;
        }
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| value.to_string())
            .collect())
    }

    fn insert_node<'a>(
        &'a self,
        tx: &'a mut PooledTransaction,
        node: &'a SchemaSql,
        object: &'a Map<String, JsonValue>,
        parent: Option<(&'a SchemaSql, &'a WrittenRow)>,
        id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<WrittenRow, MutationError>> {
        async move {
            let dialect = self.dialect.as_ref();
            let mut values = self.row_values(node, object)?;

            if let Some(id) = id {
                let column = id_column(node)?;
                values.retain(|(name, _)| name != &column.name);
                values.push((column.name.clone(), id_literal(column, id, dialect)));
            }

            let relation = match parent {
                Some((parent_node, _)) => Some(direct_relation(parent_node, node)?),
                None => None,
            };

            let mut returning = node.primary_key().to_string();
            if let (Some(relation), Some((parent_node, parent_row))) = (relation, parent) {
                if relation.is_m_2_n() || foreign_key_in_parent(relation) {
                    returning = relation.target_field.clone();
                } else {
                    let key = parent_row.literal(&relation.source_field, dialect).ok_or_else(|| {
                        MutationError::unsupported(
                            node.name(),
                            format!(
                                "no value for `{}.{}`",
                                parent_node.name(),
                                relation.source_field
                            ),
                        )
                    })?;
                    values.retain(|(name, _)| name != &relation.target_field);
                    values.push((relation.target_field.clone(), key));
                }
            }

            let rows = tx
                .execute(&statements::insert(node.name(), &values, &returning))
                .await?;
            let returned = rows.into_iter().next().and_then(|row| row.into_iter().next());
            let row = WrittenRow {
                returned: returned.map(|value| (returning.clone(), value)),
                values,
            };

            if let (Some(relation), Some((parent_node, parent_row))) = (relation, parent) {
                let target = row.literal(&relation.target_field, dialect).ok_or_else(|| {
                    MutationError::unsupported(node.name(), "insert returned no key")
                });

                if let Some(junction) = &relation.junction {
                    let source = parent_row
                        .literal(&relation.source_field, dialect)
                        .ok_or_else(|| {
                            MutationError::unsupported(junction.name.clone(), "no source key")
                        })?;
                    tx.execute(&statements::insert_junction(junction, &source, &target?))
                        .await?;
                } else if foreign_key_in_parent(relation) {
                    let parent_key = parent_row
                        .literal(parent_node.primary_key(), dialect)
                        .ok_or_else(|| {
                            MutationError::unsupported(parent_node.name(), "no primary key")
                        })?;
                    tx.execute(&statements::update(
                        parent_node.name(),
                        &[(relation.source_field.clone(), target?)],
                        parent_node.primary_key(),
                        &parent_key,
                    ))
                    .await?;
                }
            }

            for child in &node.children {
                self.insert_children(tx, child, object, node, &row).await?;
            }

            Ok(row)
        }
        .boxed()
    }

    /// Inserts the rows of `child` found in the object of its parent row
    fn insert_children<'a>(
        &'a self,
        tx: &'a mut PooledTransaction,
        child: &'a SchemaSql,
        object: &'a Map<String, JsonValue>,
        parent: &'a SchemaSql,
        parent_row: &'a WrittenRow,
    ) -> BoxFuture<'a, Result<(), MutationError>> {
        async move {
            match &child.container {
                Container::ObjectArray(path) => {
                    let items = lookup(object, relative(path, &parent.object_path))
                        .and_then(JsonValue::as_array);
                    for item in items.into_iter().flatten() {
                        if let Some(item) = item.as_object() {
                            self.insert_node(tx, child, item, Some((parent, parent_row)), None)
                                .await?;
                        }
                    }
                }
                Container::Object(path) => {
                    let item = lookup(object, relative(path, &parent.object_path))
                        .and_then(JsonValue::as_object);
                    if let Some(item) = item {
                        self.insert_node(tx, child, item, Some((parent, parent_row)), None)
                            .await?;
                    }
                }
                Container::ValueArray(path) => {
                    let path = relative(path, &parent.object_path);
                    let items = lookup(object, path).and_then(JsonValue::as_array);
                    for item in items.into_iter().flatten() {
                        let wrapped = nest(path, item.clone());
                        self.insert_node(tx, child, &wrapped, Some((parent, parent_row)), None)
                            .await?;
                    }
                }
                Container::Inline => {
                    if !self.row_values(child, object)?.is_empty() {
                        self.insert_node(tx, child, object, Some((parent, parent_row)), None)
                            .await?;
                    }
                }
                Container::Feature => {}
            }
            Ok(())
        }
        .boxed()
    }

    async fn apply_patch(
        &self,
        tx: &mut PooledTransaction,
        root: &SchemaSql,
        id: &str,
        patch: &Map<String, JsonValue>,
    ) -> Result<(), MutationError> {
        let dialect = self.dialect.as_ref();
        let id_column = id_column(root)?;
        let id_value = id_literal(id_column, id, dialect);

        let values = self.row_values(root, patch)?;
        if !values.is_empty() {
            tx.execute(&statements::update(root.name(), &values, &id_column.name, &id_value))
                .await?;
        }

        for child in &root.children {
            if !self.is_present(child, root, patch)? {
                continue;
            }
            let relation = direct_relation(root, child)?;
            let parent_key = if relation.source_field == id_column.name {
                id_value.clone()
            } else {
                format!(
                    "(SELECT {} FROM {} WHERE {}={})",
                    relation.source_field,
                    root.name(),
                    id_column.name,
                    id_value
                )
            };

            match (&child.container, &relation.junction) {
                (Container::Inline, None) => {
                    let values = self.row_values(child, patch)?;
                    tx.execute(&statements::update(
                        child.name(),
                        &values,
                        &relation.target_field,
                        &parent_key,
                    ))
                    .await?;
                    continue;
                }
                (Container::Inline, Some(_)) => {
                    return Err(MutationError::unsupported(
                        child.name(),
                        "partial update of values behind a junction table",
                    ));
                }
                (_, Some(junction)) => {
                    tx.execute(&statements::delete_where(
                        &junction.name,
                        &junction.source_field,
                        &parent_key,
                    ))
                    .await?;
                }
                (_, None) if foreign_key_in_parent(relation) => {
                    return Err(MutationError::unsupported(
                        child.name(),
                        "partial update of an object referenced by the feature table",
                    ));
                }
                (_, None) => {
                    tx.execute(&statements::delete_where(
                        child.name(),
                        &relation.target_field,
                        &parent_key,
                    ))
                    .await?;
                }
            }

            let parent_row = WrittenRow {
                returned: None,
                values: vec![(relation.source_field.clone(), parent_key)],
            };
            self.insert_children(tx, child, patch, root, &parent_row).await?;
        }

        Ok(())
    }

    fn is_present(
        &self,
        child: &SchemaSql,
        parent: &SchemaSql,
        object: &Map<String, JsonValue>,
    ) -> Result<bool, MutationError> {
        Ok(match child.container.path() {
            Some(path) => lookup(object, relative(path, &parent.object_path)).is_some(),
            None => !self.row_values(child, object)?.is_empty(),
        })
    }

    /// Column literals of one row, for the values present in `object`
    fn row_values(
        &self,
        node: &SchemaSql,
        object: &Map<String, JsonValue>,
    ) -> Result<Vec<(String, String)>, MutationError> {
        let dialect = self.dialect.as_ref();
        let mut values = Vec::new();
        let mut coalesced = HashSet::new();
        let mut array_positions: HashMap<&[String], usize> = HashMap::new();
        let in_value_array = matches!(node.container, Container::ValueArray(_));

        for column in &node.columns {
            let is_json = match &column.source {
                ColumnSource::Constant(_) => continue,
                ColumnSource::Connected { path: Some(_), .. } => continue,
                ColumnSource::Connected { path: None, .. } => true,
                ColumnSource::Column => false,
            };

            let path = relative(&column.property_path, &node.object_path);
            let Some(mut value) = lookup(object, path) else {
                continue;
            };
            if column.schema_type == SchemaType::ValueArray && !in_value_array && !is_patch_null(value) {
                let position = array_positions.entry(path).or_insert(0);
                let element = value.as_array().and_then(|items| items.get(*position));
                *position += 1;
                match element {
                    Some(element) => value = element,
                    None => continue,
                }
            }
            if value.is_null() {
                continue;
            }
            if let Some(group) = column.coalesce_group {
                if !coalesced.insert(group) {
                    continue;
                }
            }

            let literal = if is_patch_null(value) {
                "NULL".to_string()
            } else if is_json {
                let text = serde_json::to_string(value).map_err(|e| MutationError::Input {
                    message: e.to_string(),
                })?;
                format!("'{}'", dialect.escape_string(&text))
            } else {
                statements::literal(column, value, dialect)
            };
            values.push((column.name.clone(), literal));
        }

        Ok(values)
    }
}
