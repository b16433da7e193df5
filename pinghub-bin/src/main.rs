#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

mod reporter;
mod routes;
mod template;
mod transport;

use clap::Parser;
use pinghub_core::Metrics;
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "pinghub-server",
    version,
    author,
    about = "An ephemeral pub/sub bus over websockets"
)]
struct CliCommand {
    /// HTTP service address.
    #[clap(long, default_value = "127.0.0.1:8081")]
    addr: SocketAddr,

    /// Metrics service address.
    #[clap(long, default_value = "127.0.0.1:8082")]
    mport: SocketAddr,

    /// Checks the `Origin` header on websocket upgrades against this value
    /// when non-empty.
    #[clap(long, default_value = "")]
    origin: String,
}

#[tokio::main]
pub async fn main() -> pinghub_core::Result<()> {
    tracing_subscriber::fmt::try_init()?;

    let cmd = CliCommand::parse();

    let metrics = Arc::new(Metrics::new());
    let hub = pinghub_core::hub::spawn(metrics.clone());
    let ticker = pinghub_core::Ticker::start(pinghub_core::session::PING_PERIOD);

    let metrics_listener = TcpListener::bind(cmd.mport).await?;
    tokio::spawn(reporter::run(metrics_listener, metrics.clone()));

    let origin = (!cmd.origin.is_empty()).then_some(cmd.origin);
    let state = AppState {
        hub,
        ticker,
        metrics,
        addr: cmd.addr.to_string(),
        origin,
    };

    let ticker_handle = state.ticker.clone();

    info!(addr = %cmd.addr, mport = %cmd.mport, "pinghub listening");
    axum::Server::bind(&cmd.addr)
        .serve(routes::router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // §4.4: stop the shared heartbeat distributor once the HTTP server has
    // drained, closing every still-subscribed Session writer's tick stream.
    ticker_handle.stop();

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("ctrl-c received, shutting down");
}
