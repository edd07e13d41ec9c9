use crate::irondb::fetcher::BatchFetcher;
use crate::models::irondb::{Interval, SeriesData};
use async_trait::async_trait;
use std::sync::Arc;

/// What a graphing host needs from a leaf: its data and where data may exist.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Data for `[start_time, end_time]`, or `None` when nothing could be retrieved.
    async fn fetch(&self, start_time: i64, end_time: i64) -> Option<SeriesData>;

    /// Time ranges in which the source may hold data.
    fn intervals(&self) -> Vec<Interval>;
}

/// Per-leaf handle onto the batch that fetches it.
#[derive(Debug, Clone)]
pub struct SeriesReader {
    name: String,
    batch: Arc<BatchFetcher>,
}

impl SeriesReader {
    pub fn new(name: impl Into<String>, batch: Arc<BatchFetcher>) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch(&self) -> &Arc<BatchFetcher> {
        &self.batch
    }
}

#[async_trait]
impl SeriesSource for SeriesReader {
    async fn fetch(&self, start_time: i64, end_time: i64) -> Option<SeriesData> {
        self.batch.ensure_fetched(start_time, end_time).await;
        self.batch.series_for(&self.name)
    }

    fn intervals(&self) -> Vec<Interval> {
        // all time; the backend knows where data actually exists
        vec![Interval {
            start: 0,
            end: chrono::Utc::now().timestamp(),
        }]
    }
}
