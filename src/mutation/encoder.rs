use futures_util::stream::{BoxStream, StreamExt};

use super::feature_sql::{FeatureSql, PATCH_NULL_VALUE};
use super::errors::MutationError;
use crate::decoder::{FeatureCollector, FeatureEvent};

/// Turns incoming feature tokens into [`FeatureSql`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoderSql {
    partial: bool,
}

impl FeatureEncoderSql {
    /// Partial encoders write [`PATCH_NULL_VALUE`] for explicit nulls
    pub fn new(partial: bool) -> Self {
        FeatureEncoderSql { partial }
    }

    pub fn encode(&self, events: impl IntoIterator<Item = FeatureEvent>) -> Vec<FeatureSql> {
        let mut collector = self.collector();
        for event in events {
            collector.push(event);
        }
        into_features(collector)
    }

    pub async fn encode_stream(
        &self,
        mut events: BoxStream<'_, Result<FeatureEvent, MutationError>>,
    ) -> Result<Vec<FeatureSql>, MutationError> {
        let mut collector = self.collector();
        while let Some(event) = events.next().await {
            collector.push(event?);
        }
        Ok(into_features(collector))
    }

    fn collector(&self) -> FeatureCollector {
        FeatureCollector::with_null_value(self.partial.then(|| PATCH_NULL_VALUE.to_string()))
    }
}

fn into_features(collector: FeatureCollector) -> Vec<FeatureSql> {
    collector
        .finish()
        .features
        .into_iter()
        .filter_map(FeatureSql::from_json)
        .collect()
}
