#![forbid(unsafe_code)]
//! LumenChain node entry point
//!
//! Snapshots the process argument vector and environment, resolves the
//! configuration, opens the node, and closes it again on ctrl-c.

use lumenchain::config::ConfigInput;
use lumenchain::node::Node;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = ConfigInput {
        argv: Some(std::env::args().collect()),
        env: Some(std::env::vars().collect()),
        config: true,
        ..ConfigInput::default()
    };

    let mut node = Node::new(input)?;

    node.ensure()?;
    node.load_plugins()?;
    node.open().await?;

    info!(
        network = %node.network,
        prefix = %node.config.prefix.display(),
        "node is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    node.close().await?;
    Ok(())
}
