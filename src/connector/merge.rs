//! Merge of sorted per-table row streams

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{BoxStream, Stream};
use log::trace;

use super::errors::SqlError;
use super::row::SqlRow;

/// Merges streams that are each ordered by [`SqlRow::compare`] into one
/// ordered stream. Only the head row of every input is buffered.
///
/// The first error of any input ends the merged stream after it is yielded.
pub struct MergeSorted {
    inputs: Vec<BoxStream<'static, Result<SqlRow, SqlError>>>,
    heads: Vec<Option<SqlRow>>,
    exhausted: Vec<bool>,
    failed: bool,
}

impl MergeSorted {
    pub fn new(inputs: Vec<BoxStream<'static, Result<SqlRow, SqlError>>>) -> Self {
        let count = inputs.len();
        MergeSorted {
            inputs,
            heads: vec![None; count],
            exhausted: vec![false; count],
            failed: false,
        }
    }
}

impl Stream for MergeSorted {
    type Item = Result<SqlRow, SqlError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.failed {
            return Poll::Ready(None);
        }

        // every open input needs a head before the smallest can be chosen
        let mut pending = false;
        for i in 0..this.inputs.len() {
            if this.heads[i].is_some() || this.exhausted[i] {
                continue;
            }
            match this.inputs[i].as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(row))) => this.heads[i] = Some(row),
                Poll::Ready(Some(Err(e))) => {
                    this.failed = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => this.exhausted[i] = true,
                Poll::Pending => pending = true,
            }
        }

        if pending {
            return Poll::Pending;
        }

        let mut next: Option<usize> = None;
        for (i, head) in this.heads.iter().enumerate() {
            let Some(row) = head else { continue };
            next = match next {
                Some(j) => match this.heads[j].as_ref() {
                    Some(current) if row.compare(current).is_lt() => Some(i),
                    _ => Some(j),
                },
                None => Some(i),
            };
        }

        match next.and_then(|i| this.heads[i].take()) {
            Some(row) => {
                trace!("{} {:?}", row.query.name, row.sort_keys);
                Poll::Ready(Some(Ok(row)))
            }
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::row::tests::table_query;
    use crate::connector::SqlValue;
    use futures_util::{stream, StreamExt};

    fn rows(query: &std::sync::Arc<crate::query::TableQuery>, keys: &[&[i64]]) -> Vec<Result<SqlRow, SqlError>> {
        keys.iter()
            .map(|keys| {
                let values = keys.iter().map(|k| SqlValue::Int(*k)).collect();
                Ok(SqlRow::from_values(query, 0, values).unwrap().unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_merge_orders_by_key_then_priority() {
        let root = table_query("kita", &["kita.id"], 0);
        let plaetze = table_query("plaetze", &["kita.id", "plaetze.id"], 1);
        let tags = table_query("tags", &["kita.id", "tags.id"], 2);

        let merged = MergeSorted::new(vec![
            stream::iter(rows(&tags, &[&[1, 1], &[2, 2]])).boxed(),
            stream::iter(rows(&plaetze, &[&[1, 7], &[1, 8], &[3, 9]])).boxed(),
            stream::iter(rows(&root, &[&[1], &[2], &[3]])).boxed(),
        ]);

        let order: Vec<(String, Vec<SqlValue>)> = merged
            .map(|row| {
                let row = row.unwrap();
                (row.query.name.clone(), row.sort_keys)
            })
            .collect()
            .await;

        let names: Vec<&str> = order.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["kita", "plaetze", "plaetze", "tags", "kita", "tags", "kita", "plaetze"]
        );
    }

    #[tokio::test]
    async fn test_merge_stops_after_error() {
        let root = table_query("kita", &["kita.id"], 0);
        let mut failing = rows(&root, &[&[1]]);
        failing.push(Err(SqlError::query("boom")));
        failing.extend(rows(&root, &[&[5]]));

        let merged: Vec<_> = MergeSorted::new(vec![stream::iter(failing).boxed()])
            .collect()
            .await;
        assert_eq!(merged.len(), 2);
        assert!(merged[1].is_err());
    }

    #[tokio::test]
    async fn test_merge_of_nothing() {
        let merged: Vec<_> = MergeSorted::new(vec![]).collect().await;
        assert!(merged.is_empty());
    }
}
