//! Row-to-feature decoder
//!
//! Rows arrive merged by composite sort key. The decoder keeps a stack of
//! open containers and compares the levels of each value with it: levels
//! that differ in path, kind or identity (the sort key prefix that owns
//! them) are closed, the new ones opened. A change of the feature type or
//! of the root key ends the feature.

pub mod collector;
pub mod errors;
pub mod events;

use std::collections::HashSet;

use futures_util::stream::{self, BoxStream, StreamExt};
use log::trace;
use serde_json::Value as JsonValue;

use crate::connector::{SqlError, SqlRecord, SqlRow, SqlValue};
use crate::query::{ContainerLevel, LevelKind};
use crate::schema::{ColumnSource, ColumnSql, SchemaType};

pub use collector::{collect_features, FeatureCollection, FeatureCollector};
pub use errors::DecoderError;
pub use events::FeatureEvent;

#[derive(Debug, Clone, PartialEq)]
struct OpenLevel {
    path: Vec<String>,
    kind: LevelKind,
    identity: Vec<SqlValue>,
}

impl OpenLevel {
    fn start(&self) -> FeatureEvent {
        let path = self.path.clone();
        match self.kind {
            LevelKind::Object => FeatureEvent::ObjectStart { path },
            LevelKind::Array => FeatureEvent::ArrayStart { path },
        }
    }

    fn end(self) -> FeatureEvent {
        let path = self.path;
        match self.kind {
            LevelKind::Object => FeatureEvent::ObjectEnd { path },
            LevelKind::Array => FeatureEvent::ArrayEnd { path },
        }
    }
}

/// Decoding state of one feature stream
#[derive(Debug, Default)]
pub struct FeatureDecoder {
    /// Type and root key of the open feature
    feature: Option<(String, SqlValue)>,
    stack: Vec<OpenLevel>,
    /// Coalesce groups already written, per object identity
    coalesced: HashSet<(usize, Vec<String>)>,
}

impl FeatureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, record: SqlRecord) -> Result<Vec<FeatureEvent>, DecoderError> {
        let mut events = Vec::new();
        match record {
            SqlRecord::Meta(meta) => {
                self.end_feature(&mut events);
                events.push(FeatureEvent::Meta(meta));
            }
            SqlRecord::Row(row) => self.decode_row(&row, &mut events)?,
        }
        Ok(events)
    }

    /// Closes the last feature
    pub fn finish(&mut self) -> Vec<FeatureEvent> {
        let mut events = Vec::new();
        self.end_feature(&mut events);
        events
    }

    fn decode_row(&mut self, row: &SqlRow, events: &mut Vec<FeatureEvent>) -> Result<(), DecoderError> {
        trace!("{} {:?} {:?}", row.query.name, row.sort_keys, row.values);

        let Some(root_key) = row.sort_keys.first() else {
            return Ok(());
        };
        let query = &row.query;
        let same_feature = matches!(
            &self.feature,
            Some((type_name, key)) if *type_name == query.type_name && key == root_key
        );
        if !same_feature {
            self.end_feature(events);
            events.push(FeatureEvent::feature_start(query.type_name.clone()));
            self.feature = Some((query.type_name.clone(), root_key.clone()));
        }

        let mut values = row.values.iter();
        for column in &query.columns {
            let value = match &column.source {
                ColumnSource::Constant(literal) => SqlValue::Text(literal.clone()),
                _ => values.next().cloned().unwrap_or(SqlValue::Null),
            };
            if value.is_null() {
                continue;
            }

            if let Some(group) = column.coalesce_group {
                let depth = query.object_depth.min(row.sort_keys.len());
                let identity = row.sort_keys[..depth].iter().map(SqlValue::to_string).collect();
                if !self.coalesced.insert((group, identity)) {
                    continue;
                }
            }

            let mut levels = query.column_levels(column);
            let array_column = column.schema_type == SchemaType::ValueArray && !query.is_value_array();
            if array_column {
                levels.push(ContainerLevel::array(
                    column.property_path.clone(),
                    query.object_depth,
                ));
            }
            self.sync(&levels, &row.sort_keys, events);

            match &column.source {
                ColumnSource::Connected { path, .. } => {
                    decode_json(column, path.as_deref(), &value, events)?
                }
                _ => {
                    let value_type = if array_column {
                        column.value_type.unwrap_or(SchemaType::String)
                    } else {
                        column.schema_type
                    };
                    events.push(FeatureEvent::value(
                        &column.property_path,
                        value.to_string(),
                        value_type,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Closes open levels not shared with `levels`, then opens the rest
    fn sync(&mut self, levels: &[ContainerLevel], keys: &[SqlValue], events: &mut Vec<FeatureEvent>) {
        let targets: Vec<OpenLevel> = levels
            .iter()
            .map(|level| OpenLevel {
                path: level.path.clone(),
                kind: level.kind,
                identity: keys[..level.depth.min(keys.len())].to_vec(),
            })
            .collect();

        let common = self
            .stack
            .iter()
            .zip(&targets)
            .take_while(|(open, target)| open == target)
            .count();

        while self.stack.len() > common {
            if let Some(level) = self.stack.pop() {
                events.push(level.end());
            }
        }
        for target in targets.into_iter().skip(common) {
            events.push(target.start());
            self.stack.push(target);
        }
    }

    fn end_feature(&mut self, events: &mut Vec<FeatureEvent>) {
        if self.feature.take().is_none() {
            return;
        }
        while let Some(level) = self.stack.pop() {
            events.push(level.end());
        }
        self.coalesced.clear();
        events.push(FeatureEvent::FeatureEnd);
    }
}

/// Events of a JSON column, optionally only the part at `path`
fn decode_json(
    column: &ColumnSql,
    path: Option<&str>,
    value: &SqlValue,
    events: &mut Vec<FeatureEvent>,
) -> Result<(), DecoderError> {
    let text = value.to_string();
    let document: JsonValue = serde_json::from_str(&text).map_err(|e| DecoderError::InvalidJson {
        column: column.name.clone(),
        message: e.to_string(),
    })?;

    let selected = match path {
        Some(path) => document.pointer(&format!("/{}", path.replace('.', "/"))),
        None => Some(&document),
    };
    if let Some(selected) = selected {
        let scalar_type = if column.schema_type.is_object() || column.schema_type.is_array() {
            None
        } else {
            Some(column.schema_type)
        };
        json_events(&column.property_path, selected, scalar_type, events);
    }
    Ok(())
}

fn json_events(
    path: &[String],
    value: &JsonValue,
    scalar_type: Option<SchemaType>,
    events: &mut Vec<FeatureEvent>,
) {
    match value {
        JsonValue::Null => {}
        JsonValue::Object(map) => {
            events.push(FeatureEvent::ObjectStart { path: path.to_vec() });
            for (key, nested) in map {
                let mut nested_path = path.to_vec();
                nested_path.push(key.clone());
                json_events(&nested_path, nested, None, events);
            }
            events.push(FeatureEvent::ObjectEnd { path: path.to_vec() });
        }
        JsonValue::Array(items) => {
            events.push(FeatureEvent::ArrayStart { path: path.to_vec() });
            for item in items {
                json_events(path, item, None, events);
            }
            events.push(FeatureEvent::ArrayEnd { path: path.to_vec() });
        }
        JsonValue::Bool(b) => events.push(FeatureEvent::value(
            path,
            b.to_string(),
            scalar_type.unwrap_or(SchemaType::Boolean),
        )),
        JsonValue::Number(n) => {
            let inferred = if n.is_f64() {
                SchemaType::Float
            } else {
                SchemaType::Integer
            };
            events.push(FeatureEvent::value(path, n.to_string(), scalar_type.unwrap_or(inferred)))
        }
        JsonValue::String(s) => events.push(FeatureEvent::value(
            path,
            s.clone(),
            scalar_type.unwrap_or(SchemaType::String),
        )),
    }
}

struct DecodeState {
    records: BoxStream<'static, Result<SqlRecord, SqlError>>,
    decoder: FeatureDecoder,
    done: bool,
}

/// Turns a source stream into feature events; the first error ends it
pub fn decode_stream(
    records: BoxStream<'static, Result<SqlRecord, SqlError>>,
) -> BoxStream<'static, Result<FeatureEvent, DecoderError>> {
    let state = DecodeState {
        records,
        decoder: FeatureDecoder::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let events: Vec<Result<FeatureEvent, DecoderError>> = match state.records.next().await {
            Some(Ok(record)) => match state.decoder.decode(record) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => {
                    state.done = true;
                    vec![Err(e)]
                }
            },
            Some(Err(e)) => {
                state.done = true;
                vec![Err(e.into())]
            }
            None => {
                state.done = true;
                state.decoder.finish().into_iter().map(Ok).collect()
            }
        };
        Some((stream::iter(events), state))
    })
    .flatten()
    .boxed()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{QueryGeneration, SourcePathDefaults};
    use crate::dialect::SqlDialectPostGis;
    use crate::query::{QueryTemplateDeriver, SqlQueryTemplates, TableQuery};
    use crate::schema::{FeatureSchema, Role, SchemaDeriver};
    use crate::sql_path::SqlPathParser;

    pub(crate) fn derive(schema: &FeatureSchema) -> SqlQueryTemplates {
        let parser = SqlPathParser::new(&SourcePathDefaults::default(), Vec::<String>::new()).unwrap();
        let root = SchemaDeriver::new(&parser).derive(schema).unwrap().remove(0);
        QueryTemplateDeriver::new(Arc::new(SqlDialectPostGis), QueryGeneration::default())
            .derive(&schema.name, &root)
            .unwrap()
    }

    pub(crate) fn kita() -> FeatureSchema {
        FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita{sortKey=id}")
            .with_properties(vec![
                FeatureSchema::new("id", SchemaType::String)
                    .with_source_path("id")
                    .with_role(Role::Id),
                FeatureSchema::new("name", SchemaType::String).with_source_path("name"),
                FeatureSchema::new("kategorie", SchemaType::String).with_constant("KITA"),
                FeatureSchema::new("plaetze", SchemaType::ObjectArray)
                    .with_source_path("[oid=kita_fk]plaetze{filter=anzahl IS NOT NULL AND anzahl>0}")
                    .with_properties(vec![
                        FeatureSchema::new("anzahl", SchemaType::Integer).with_source_path("anzahl"),
                    ]),
                FeatureSchema::new("tags", SchemaType::ValueArray)
                    .with_value_type(SchemaType::String)
                    .with_source_path("[id=kita_id]tags/tag"),
            ])
    }

    pub(crate) fn row(query: &Arc<TableQuery>, values: Vec<SqlValue>) -> SqlRecord {
        SqlRecord::Row(SqlRow::from_values(query, 0, values).unwrap().unwrap())
    }

    fn decode_all(records: Vec<SqlRecord>) -> Vec<FeatureEvent> {
        let mut decoder = FeatureDecoder::new();
        let mut events = Vec::new();
        for record in records {
            events.extend(decoder.decode(record).unwrap());
        }
        events.extend(decoder.finish());
        events
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_object_array_boundaries() {
        let templates = derive(&kita());
        let queries = templates.table_queries();
        let (kita, plaetze) = (&queries[0], &queries[1]);

        let events = decode_all(vec![
            row(kita, vec![SqlValue::Int(1), "k1".into(), "Sonne".into()]),
            row(plaetze, vec![SqlValue::Int(1), SqlValue::Int(10), SqlValue::Int(25)]),
            row(plaetze, vec![SqlValue::Int(1), SqlValue::Int(11), SqlValue::Int(5)]),
        ]);

        assert_eq!(
            events,
            vec![
                FeatureEvent::feature_start("kita"),
                FeatureEvent::value(&path(&["id"]), "k1", SchemaType::String),
                FeatureEvent::value(&path(&["name"]), "Sonne", SchemaType::String),
                FeatureEvent::value(&path(&["kategorie"]), "KITA", SchemaType::String),
                FeatureEvent::ArrayStart { path: path(&["plaetze"]) },
                FeatureEvent::ObjectStart { path: path(&["plaetze"]) },
                FeatureEvent::value(&path(&["plaetze", "anzahl"]), "25", SchemaType::Integer),
                FeatureEvent::ObjectEnd { path: path(&["plaetze"]) },
                FeatureEvent::ObjectStart { path: path(&["plaetze"]) },
                FeatureEvent::value(&path(&["plaetze", "anzahl"]), "5", SchemaType::Integer),
                FeatureEvent::ObjectEnd { path: path(&["plaetze"]) },
                FeatureEvent::ArrayEnd { path: path(&["plaetze"]) },
                FeatureEvent::FeatureEnd,
            ]
        );
    }

    #[test]
    fn test_root_key_change_starts_feature() {
        let templates = derive(&kita());
        let queries = templates.table_queries();
        let (kita, tags) = (&queries[0], &queries[2]);

        let events = decode_all(vec![
            row(kita, vec![SqlValue::Int(1), "k1".into(), SqlValue::Null]),
            row(tags, vec![SqlValue::Int(1), SqlValue::Int(3), "bio".into()]),
            row(kita, vec![SqlValue::Int(2), "k2".into(), "Mond".into()]),
        ]);

        let starts = events.iter().filter(|e| e.is_feature_start()).count();
        let ends = events.iter().filter(|e| **e == FeatureEvent::FeatureEnd).count();
        assert_eq!((starts, ends), (2, 2));

        // null values produce no event, the array closes before the feature
        assert!(!events.contains(&FeatureEvent::value(&path(&["name"]), "NULL", SchemaType::String)));
        let array_end = events
            .iter()
            .position(|e| *e == FeatureEvent::ArrayEnd { path: path(&["tags"]) })
            .unwrap();
        assert_eq!(events[array_end + 1], FeatureEvent::FeatureEnd);
    }

    #[test]
    fn test_constants_read_no_column() {
        let templates = derive(&kita());
        let kita = &templates.table_queries()[0];
        assert_eq!(kita.selected_columns().count(), 2);

        let events = decode_all(vec![row(kita, vec![SqlValue::Int(1), "k1".into(), "Sonne".into()])]);
        assert!(events.contains(&FeatureEvent::value(&path(&["kategorie"]), "KITA", SchemaType::String)));
    }

    #[test]
    fn test_coalesce_first_non_null_wins() {
        let mut name = FeatureSchema::new("name", SchemaType::String);
        name.coalesce = vec![
            FeatureSchema::new("", SchemaType::String).with_source_path("name_de"),
            FeatureSchema::new("", SchemaType::String).with_source_path("name_en"),
        ];
        let schema = FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita")
            .with_properties(vec![name]);
        let templates = derive(&schema);
        let kita = &templates.table_queries()[0];

        let events = decode_all(vec![
            row(kita, vec![SqlValue::Int(1), SqlValue::Null, "Sun".into()]),
            row(kita, vec![SqlValue::Int(2), "Mond".into(), "Moon".into()]),
        ]);
        let values: Vec<_> = events.into_iter().filter(FeatureEvent::is_value).collect();
        assert_eq!(
            values,
            vec![
                FeatureEvent::value(&path(&["name"]), "Sun", SchemaType::String),
                FeatureEvent::value(&path(&["name"]), "Mond", SchemaType::String),
            ]
        );
    }

    #[test]
    fn test_json_column() {
        let schema = FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita")
            .with_properties(vec![
                FeatureSchema::new("zip", SchemaType::Integer).with_source_path("[JSON]doc/address/zip"),
            ]);
        let templates = derive(&schema);
        let kita = &templates.table_queries()[0];

        let events = decode_all(vec![row(
            kita,
            vec![SqlValue::Int(1), r#"{"address":{"zip":"12345"}}"#.into()],
        )]);
        assert!(events.contains(&FeatureEvent::value(&path(&["zip"]), "12345", SchemaType::Integer)));

        let mut decoder = FeatureDecoder::new();
        let broken = decoder.decode(row(kita, vec![SqlValue::Int(1), "{".into()]));
        assert!(matches!(broken, Err(DecoderError::InvalidJson { .. })));
    }

    #[test]
    fn test_equal_keys_of_different_types_are_separate_features() {
        let schule = FeatureSchema::new("schule", SchemaType::Object)
            .with_source_path("/schule")
            .with_properties(vec![
                FeatureSchema::new("name", SchemaType::String).with_source_path("name"),
            ]);
        let kita_templates = derive(&kita());
        let schule_templates = derive(&schule);
        let kita = &kita_templates.table_queries()[0];
        let schule = &schule_templates.table_queries()[0];

        let events = decode_all(vec![
            row(kita, vec![SqlValue::Int(1), "k1".into(), "Sonne".into()]),
            row(kita, vec![SqlValue::Int(2), "k2".into(), "Mond".into()]),
            row(schule, vec![SqlValue::Int(2), "Linden".into()]),
            row(schule, vec![SqlValue::Int(3), "Eichen".into()]),
        ]);

        let starts: Vec<&FeatureEvent> = events.iter().filter(|e| e.is_feature_start()).collect();
        assert_eq!(
            starts,
            vec![
                &FeatureEvent::feature_start("kita"),
                &FeatureEvent::feature_start("kita"),
                &FeatureEvent::feature_start("schule"),
                &FeatureEvent::feature_start("schule"),
            ]
        );
        assert!(events.contains(&FeatureEvent::value(&path(&["name"]), "Mond", SchemaType::String)));
    }

    #[tokio::test]
    async fn test_sibling_arrays_on_one_table_open_once() {
        let schema = FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita")
            .with_properties(vec![
                FeatureSchema::new("wohn", SchemaType::ObjectArray)
                    .with_source_path("[id=wohn_fk]adresse")
                    .with_properties(vec![
                        FeatureSchema::new("ort", SchemaType::String).with_source_path("ort"),
                    ]),
                FeatureSchema::new("post", SchemaType::ObjectArray)
                    .with_source_path("[id=post_fk]adresse")
                    .with_properties(vec![
                        FeatureSchema::new("ort", SchemaType::String).with_source_path("ort"),
                    ]),
            ]);
        let templates = derive(&schema);
        let queries = templates.table_queries();
        let (kita, wohn, post) = (&queries[0], &queries[1], &queries[2]);
        assert_ne!(wohn.sort_key_names, post.sort_key_names);

        let input = |query: &Arc<TableQuery>, rows: Vec<Vec<SqlValue>>| {
            let rows: Vec<Result<SqlRow, SqlError>> = rows
                .into_iter()
                .map(|values| Ok(SqlRow::from_values(query, 0, values).unwrap().unwrap()))
                .collect();
            stream::iter(rows).boxed()
        };
        let merged: Vec<SqlRecord> = crate::connector::MergeSorted::new(vec![
            input(post, vec![vec![SqlValue::Int(1), SqlValue::Int(20), "Bonn".into()]]),
            input(
                wohn,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Int(10), "Köln".into()],
                    vec![SqlValue::Int(1), SqlValue::Int(30), "Aachen".into()],
                ],
            ),
            input(kita, vec![vec![SqlValue::Int(1)]]),
        ])
        .map(|row| SqlRecord::Row(row.unwrap()))
        .collect()
        .await;

        let events = decode_all(merged);
        let opened = |name: &str| {
            events
                .iter()
                .filter(|e| **e == FeatureEvent::ArrayStart { path: path(&[name]) })
                .count()
        };
        assert_eq!((opened("wohn"), opened("post")), (1, 1));
    }

    #[tokio::test]
    async fn test_stream_error_ends_events() {
        let records = stream::iter(vec![Err(SqlError::Closed)]).boxed();
        let events: Vec<_> = decode_stream(records).collect().await;
        assert_eq!(events, vec![Err(DecoderError::Sql(SqlError::Closed))]);
    }
}
