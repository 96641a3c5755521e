use anyhow::Result;
use fantom_chess::uci::UciHandler;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut uci = UciHandler::new();
    uci.run()
}
