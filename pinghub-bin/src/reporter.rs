//! Plaintext TCP metrics reporter (§4.6), ported from
//! `original_source/metrics.go`'s `startMetrics`/`report`: accept, write the
//! current counters, close.

use pinghub_core::Metrics;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Accept connections on `addr` forever, writing the current snapshot of
/// `metrics` to each one and closing it. Intended to run for the lifetime of
/// the process; `main` does not await this task's completion.
pub async fn run(listener: TcpListener, metrics: Arc<Metrics>) {
    debug!(addr = ?listener.local_addr().ok(), "metrics reporter listening");
    loop {
        let (mut stream, _peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "metrics reporter accept failed");
                continue;
            }
        };

        let report = metrics.report();
        tokio::spawn(async move {
            let _ = stream.write_all(report.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}
