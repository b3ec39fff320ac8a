use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use querydesk_core::stream::{data_events, DataLineDecoder};
use querydesk_core::{telemetry, FileSessionStore, RouteDecision, RouteGate, SessionManager};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for QueryDesk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an offline smoke test of the session, gate and stream decoder.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let store = FileSessionStore::new(temp_dir.path().to_path_buf());
    let (session, mut events) = SessionManager::new(Arc::new(store));

    session.establish("smoke-token", None)?;
    let gate = RouteGate::new();
    let cookie = session.cookie_header();
    if gate.evaluate("/dashboard", cookie.as_deref()) != RouteDecision::Pass {
        bail!("signed-in session was turned away by the route gate");
    }

    if !session.expire() || session.expire() {
        bail!("session expiry did not fire exactly once");
    }
    let mut seen = 0;
    while events.try_recv().is_ok() {
        seen += 1;
    }
    info!("events" = seen, "session lifecycle checked");

    let body = "data: SELECT 1\n: keep-alive\ndata: [DONE]\n";
    let mut decoder = DataLineDecoder::new();
    let direct = decoder.push(body.as_bytes());
    let chunks = body
        .as_bytes()
        .chunks(5)
        .map(|chunk| Ok::<_, std::io::Error>(chunk.to_vec()))
        .collect::<Vec<_>>();
    let streamed = runtime.block_on(async {
        use futures::TryStreamExt;
        data_events(futures::stream::iter(chunks))
            .try_collect::<Vec<_>>()
            .await
    })?;
    if direct != streamed {
        bail!("chunked decoding diverged: {direct:?} vs {streamed:?}");
    }
    info!("payloads" = streamed.len(), "stream decoder checked");

    Ok(())
}
