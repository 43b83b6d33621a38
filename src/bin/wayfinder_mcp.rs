

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wayfinder::mcp::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn").add_directive("wayfinder::mcp=info".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    run_server().await
}
