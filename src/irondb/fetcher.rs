use crate::irondb::client::ClusterClient;
use crate::models::irondb::{FetchResult, LeafRequest, SeriesData};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Membership {
    leaves: Vec<LeafRequest>,
    sealed: bool,
}

/// A group of leaves that share one `/series_multi/` round-trip.
///
/// Leaves are appended while discovery streams past. The first reader to ask
/// for data seals the membership and runs the fetch; everyone else waits on
/// the batch lock and reads the same outcome. A failed fetch is final.
pub struct BatchFetcher {
    id: usize,
    client: Arc<ClusterClient>,
    members: RwLock<Membership>,
    settled: AtomicBool,
    fetch_lock: Mutex<()>,
    results: OnceLock<FetchResult>,
}

impl BatchFetcher {
    pub fn new(id: usize, client: Arc<ClusterClient>) -> Self {
        Self {
            id,
            client,
            members: RwLock::new(Membership::default()),
            settled: AtomicBool::new(false),
            fetch_lock: Mutex::new(()),
            results: OnceLock::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Appends a leaf unless a fetch has already sealed the batch, in which
    /// case the leaf is handed back. Returns the new member count.
    pub async fn try_add_leaf(&self, leaf: LeafRequest) -> Result<usize, LeafRequest> {
        let mut members = self.members.write().await;
        if members.sealed {
            return Err(leaf);
        }
        members.leaves.push(leaf);
        Ok(members.leaves.len())
    }

    pub async fn leaf_names(&self) -> Vec<String> {
        self.members
            .read()
            .await
            .leaves
            .iter()
            .map(|l| l.leaf_name.clone())
            .collect()
    }

    /// Runs the batch's network fetch at most once, however many callers race here.
    pub async fn ensure_fetched(&self, start_time: i64, end_time: i64) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.fetch_lock.lock().await;
        // recheck in case we were waiting
        if self.settled.load(Ordering::Acquire) {
            return;
        }

        // The membership lock must not be held across the request.
        let leaves = {
            let mut members = self.members.write().await;
            members.sealed = true;
            members.leaves.clone()
        };
        debug!(
            "Fetching batch {} ({} leaves, {}..{})",
            self.id,
            leaves.len(),
            start_time,
            end_time
        );

        match self.client.fetch_series(&leaves, start_time, end_time).await {
            Some(result) => {
                if self.results.set(result).is_err() {
                    warn!("Batch {} results were already set", self.id);
                }
            }
            None => info!(
                "Batch {} fetch failed; its {} leaves will report no data",
                self.id,
                leaves.len()
            ),
        }

        self.settled.store(true, Ordering::Release);
    }

    /// True once a fetch has run to completion or exhausted its retries.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// True when a fetch produced a response (usable or not).
    pub fn is_fetched(&self) -> bool {
        self.results.get().is_some()
    }

    pub fn is_error(&self) -> bool {
        self.results.get().map_or(true, FetchResult::is_unusable)
    }

    /// Samples for one leaf, or `None` when the batch has no usable data.
    ///
    /// A leaf missing from the response (or with an empty sample list) is
    /// reported as nulls covering the whole range.
    pub fn series_for(&self, leaf_name: &str) -> Option<SeriesData> {
        let results = self.results.get().filter(|r| !r.is_unusable())?;

        let values = match results.series.as_ref().and_then(|s| s.get(leaf_name)) {
            Some(values) if !values.is_empty() => values.clone(),
            _ => vec![None; results.slot_count()],
        };

        Some(SeriesData {
            time_info: results.time_info(),
            values,
        })
    }

    #[cfg(test)]
    pub(crate) fn settle_with(&self, result: Option<FetchResult>) {
        if let Some(result) = result {
            let _ = self.results.set(result);
        }
        self.settled.store(true, Ordering::Release);
    }
}

impl fmt::Debug for BatchFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchFetcher")
            .field("id", &self.id)
            .field("settled", &self.is_settled())
            .field("fetched", &self.is_fetched())
            .finish_non_exhaustive()
    }
}
