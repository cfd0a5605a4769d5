//! Chunked source stream
//!
//! Every chunk runs the meta queries of all query sets, then the value
//! queries of the sets that returned features, merged into one ordered
//! stream that starts with the combined meta row.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use log::debug;

use super::errors::SqlError;
use super::merge::MergeSorted;
use super::pool::PoolHandle;
use super::row::{SqlRecord, SqlRow, SqlRowMeta};
use super::value::SqlValue;
use crate::query::{MetaQueryParams, SqlQueryTemplates};

/// Templates of one feature type and the encoded user filter
#[derive(Debug, Clone)]
pub struct QuerySet {
    pub templates: Arc<SqlQueryTemplates>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryBatch {
    /// `0` means unlimited
    pub limit: u64,
    pub offset: u64,
    pub chunk_size: u64,
    pub sets: Vec<QuerySet>,
    pub with_number_skipped: bool,
}

#[derive(Debug)]
struct ChunkState {
    batch: QueryBatch,
    remaining: Option<u64>,
    after: Vec<Option<SqlValue>>,
    exhausted: Vec<bool>,
    first: bool,
}

impl ChunkState {
    fn finished(&self) -> bool {
        self.remaining == Some(0) || self.exhausted.iter().all(|done| *done)
    }
}

#[derive(Debug, Clone)]
pub struct SqlConnector {
    pool: PoolHandle,
}

impl SqlConnector {
    pub fn new(pool: PoolHandle) -> Self {
        SqlConnector { pool }
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub fn source_stream(&self, batch: QueryBatch) -> BoxStream<'static, Result<SqlRecord, SqlError>> {
        let sets = batch.sets.len();
        let state = ChunkState {
            remaining: (batch.limit > 0).then_some(batch.limit),
            after: vec![None; sets],
            exhausted: vec![false; sets],
            first: true,
            batch,
        };
        let pool = self.pool.clone();

        stream::unfold(state, move |mut state| {
            let pool = pool.clone();
            async move {
                if state.finished() {
                    return None;
                }
                let chunk = match next_chunk(&pool, &mut state).await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => return None,
                    Err(e) => {
                        state.exhausted.iter_mut().for_each(|done| *done = true);
                        stream::iter(vec![Err(e)]).boxed()
                    }
                };
                Some((chunk, state))
            }
        })
        .flatten()
        .boxed()
    }
}

/// Runs the meta queries of the next chunk and returns its row stream
async fn next_chunk(
    pool: &PoolHandle,
    state: &mut ChunkState,
) -> Result<Option<BoxStream<'static, Result<SqlRecord, SqlError>>>, SqlError> {
    let chunk_size = state.batch.chunk_size.max(1);
    let first = state.first;
    state.first = false;

    let mut meta: Option<SqlRowMeta> = None;
    let mut windows: Vec<(usize, SqlValue, SqlValue)> = Vec::new();

    for (i, set) in state.batch.sets.iter().enumerate() {
        if state.exhausted[i] {
            continue;
        }
        let returned_so_far = meta.as_ref().map(|m| m.number_returned as u64).unwrap_or(0);
        let limit = match state.remaining {
            Some(remaining) => chunk_size.min(remaining.saturating_sub(returned_so_far)),
            None => chunk_size,
        };
        if limit == 0 {
            break;
        }

        let sql = set.templates.meta.generate(&MetaQueryParams {
            limit,
            offset: if first { state.batch.offset } else { 0 },
            after: state.after[i].as_ref(),
            filter: set.filter.as_deref(),
            with_number_skipped: first && state.batch.with_number_skipped,
        });
        debug!("Meta query of {}: {}", set.templates.type_name, sql);

        let rows = pool.query(&sql).await?;
        let set_meta = match rows.first() {
            Some(values) => SqlRowMeta::from_values(values)?,
            None => SqlRowMeta::empty(),
        };

        if (set_meta.number_returned as u64) < limit {
            state.exhausted[i] = true;
        }
        if set_meta.number_returned > 0 {
            state.after[i] = Some(set_meta.max_key.clone());
            windows.push((i, set_meta.min_key.clone(), set_meta.max_key.clone()));
        }

        meta = Some(match meta {
            Some(combined) => combined.combine(&set_meta),
            None => set_meta,
        });
    }

    let Some(meta) = meta else {
        return Ok(None);
    };
    if !first && meta.number_returned == 0 {
        return Ok(None);
    }
    if let Some(remaining) = state.remaining.as_mut() {
        *remaining = remaining.saturating_sub(meta.number_returned as u64);
    }

    let mut inputs = Vec::new();
    let mut priority_base = 0;
    for (i, set) in state.batch.sets.iter().enumerate() {
        let window = windows.iter().find(|(index, _, _)| *index == i);
        if let Some((_, min_key, max_key)) = window {
            for template in &set.templates.values {
                let sql = template.generate(min_key, max_key, set.filter.as_deref());
                debug!("Value query of {}: {}", template.query().name, sql);

                let query = template.query().clone();
                let rows = pool
                    .query_stream(&sql)
                    .filter_map(move |values| {
                        let row = values.and_then(|values| SqlRow::from_values(&query, priority_base, values));
                        async move { row.transpose() }
                    })
                    .boxed();
                inputs.push(rows);
            }
        }
        priority_base += set.templates.values.len();
    }

    let rows = MergeSorted::new(inputs).map(|row| row.map(SqlRecord::Row));
    Ok(Some(
        stream::iter(vec![Ok(SqlRecord::Meta(meta))])
            .chain(rows)
            .boxed(),
    ))
}
