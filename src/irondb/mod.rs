pub mod client;
pub mod codec;
pub mod fetcher;
pub mod finder;
pub mod hosts;
pub mod node;
pub mod reader;

pub use client::ClusterClient;
pub use codec::MetricCodec;
pub use fetcher::BatchFetcher;
pub use finder::Finder;
pub use hosts::HostRotator;
pub use node::{BranchNode, LeafNode, Node, NodeStream};
pub use reader::{SeriesReader, SeriesSource};
