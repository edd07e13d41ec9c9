use crate::config::FinderConfig;
use crate::errors::{FinderError, FinderResult};
use crate::irondb::client::ClusterClient;
use crate::irondb::codec::MetricCodec;
use crate::irondb::fetcher::BatchFetcher;
use crate::irondb::hosts::HostRotator;
use crate::irondb::node::{BranchNode, LeafNode, Node, NodeStream};
use crate::irondb::reader::SeriesReader;
use crate::models::irondb::{DiscoveryEntry, LeafRequest};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// Entry point for resolving metric patterns against an IRONdb cluster.
pub struct Finder {
    client: Arc<ClusterClient>,
    batch_size: usize,
}

impl Finder {
    pub fn new(config: &FinderConfig) -> FinderResult<Self> {
        Self::with_codec(config, None)
    }

    /// Builds a finder that also negotiates the binary result encodings.
    pub fn with_codec(
        config: &FinderConfig,
        codec: Option<Arc<dyn MetricCodec>>,
    ) -> FinderResult<Self> {
        config
            .validate()
            .map_err(|e| FinderError::Configuration(e.to_string()))?;

        let hosts = Arc::new(HostRotator::new(config.hosts())?);
        info!(
            "IRONdb finder: {} hosts, batch size {}, {} max retries, binary codec: {}",
            hosts.count(),
            config.batch_size,
            config.max_retries,
            codec.is_some()
        );

        let client = ClusterClient::new(config, hosts, codec)?;
        Ok(Self {
            client: Arc::new(client),
            batch_size: config.batch_size,
        })
    }

    /// Lazily resolves `pattern` into nodes, in backend order.
    ///
    /// Discovery runs on the first poll. Consecutive leaves are grouped into
    /// batches of `batch_size` that each fetch their data in one request when
    /// any of their readers is first asked for it.
    pub fn find_nodes(&self, pattern: &str) -> NodeStream {
        let client = Arc::clone(&self.client);
        let batch_size = self.batch_size;
        let pattern = pattern.to_string();

        let nodes = stream::once(async move {
            let entries = client.find(&pattern).await;
            debug!("Pattern {} matched {} names", pattern, entries.len());

            let assembler = BatchAssembler::new(client, batch_size);
            stream::unfold(
                (assembler, entries.into_iter()),
                |(mut assembler, mut entries)| async move {
                    let entry = entries.next()?;
                    let node = assembler.place(entry).await;
                    Some((node, (assembler, entries)))
                },
            )
        })
        .flatten();

        Box::pin(nodes)
    }
}

/// Assigns discovered leaves to fixed-size batches as they stream past.
struct BatchAssembler {
    client: Arc<ClusterClient>,
    batch_size: usize,
    current: Arc<BatchFetcher>,
    counter: usize,
    next_id: usize,
}

impl BatchAssembler {
    fn new(client: Arc<ClusterClient>, batch_size: usize) -> Self {
        let current = Arc::new(BatchFetcher::new(0, Arc::clone(&client)));
        Self {
            client,
            batch_size,
            current,
            counter: 0,
            next_id: 1,
        }
    }

    fn start_batch(&mut self) {
        self.current = Arc::new(BatchFetcher::new(self.next_id, Arc::clone(&self.client)));
        self.next_id += 1;
        self.counter = 0;
    }

    async fn place(&mut self, entry: DiscoveryEntry) -> Node {
        let (name, leaf_data) = match entry {
            DiscoveryEntry::Branch { name } => return Node::Branch(BranchNode { name }),
            DiscoveryEntry::Leaf { name, leaf_data } => (name, leaf_data),
        };

        let mut leaf = LeafRequest {
            leaf_name: name.clone(),
            leaf_data,
        };
        // A reader may already have fetched the current batch while we were streaming.
        while let Err(rejected) = self.current.try_add_leaf(leaf).await {
            debug!(
                "Batch {} sealed by an early fetch, starting a new one",
                self.current.id()
            );
            leaf = rejected;
            self.start_batch();
        }

        let reader = SeriesReader::new(name.clone(), Arc::clone(&self.current));
        self.counter += 1;
        if self.counter >= self.batch_size {
            self.start_batch();
        }

        Node::Leaf(LeafNode { name, reader })
    }
}
