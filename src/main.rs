use clap::Parser;
use futures::future::join_all;
use futures::StreamExt;
use irondb_finder::config::FinderConfig;
use irondb_finder::irondb::{Finder, LeafNode, Node, SeriesSource};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// List IRONdb metrics matching a pattern and optionally fetch their data
#[derive(Parser, Debug)]
#[command(name = "irondb-finder", version)]
struct Cli {
    /// TOML file with an `[irondb]` table (environment variables otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Metric pattern, e.g. `app.*.cpu`
    pattern: String,

    /// Range start in unix seconds; fetches every matched leaf
    #[arg(requires = "until")]
    from: Option<i64>,

    /// Range end in unix seconds
    #[arg(requires = "from")]
    until: Option<i64>,
}

impl Cli {
    fn range(&self) -> anyhow::Result<Option<(i64, i64)>> {
        match (self.from, self.until) {
            (Some(from), Some(until)) if until < from => {
                anyhow::bail!("Range end {until} precedes start {from}")
            }
            (Some(from), Some(until)) => Ok(Some((from, until))),
            _ => Ok(None),
        }
    }
}

fn setup_logging() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = EnvFilter::try_new(format!("{level},hyper=warn,reqwest=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
    }
}

fn format_node(node: &Node) -> String {
    match node {
        Node::Leaf(leaf) => format!("leaf    {}", leaf.name),
        Node::Branch(branch) => format!("branch  {}", branch.name),
    }
}

async fn fetch_leaf(leaf: &LeafNode, from: i64, until: i64) -> serde_json::Value {
    match leaf.reader.fetch(from, until).await {
        Some(data) => serde_json::json!({ "name": leaf.name, "data": data }),
        None => serde_json::json!({ "name": leaf.name, "data": null }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let range = cli.range()?;

    setup_logging();

    let config = match &cli.config {
        Some(path) => FinderConfig::from_file(path),
        None => FinderConfig::new(),
    }
    .map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {e}. Please check your environment variables and configuration."
        )
    })?;

    info!("Starting irondb-finder v{}", env!("CARGO_PKG_VERSION"));

    let finder = Finder::new(&config).map_err(|e| {
        error!("Failed to initialize finder: {e}");
        anyhow::anyhow!("Finder initialization failed: {e}")
    })?;

    let nodes: Vec<Node> = finder.find_nodes(&cli.pattern).collect().await;
    if nodes.is_empty() {
        info!("No metrics matched {}", cli.pattern);
    }

    for node in &nodes {
        println!("{}", format_node(node));
    }

    if let Some((from, until)) = range {
        let leaves: Vec<&LeafNode> = nodes.iter().filter_map(Node::as_leaf).collect();
        let results = join_all(leaves.iter().map(|leaf| fetch_leaf(leaf, from, until))).await;
        for result in results {
            println!("{result}");
        }
    }

    Ok(())
}
