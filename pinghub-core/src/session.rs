//! The Session reader/writer pair (§4.3) and the `Transport` seam it talks
//! through (§6).
//!
//! Ported control-flow from `original_source/conn.go`'s `run`/`reader`/
//! `writer`, with the deadline/pong-handler machinery from `websocket.go`
//! generalized into the `Transport` trait below, since `axum`'s WebSocket has
//! no `SetReadDeadline`/`SetPongHandler` knobs the way `gorilla/websocket`
//! does -- §6 works those out as `tokio::time::timeout` wrapping reads and
//! writes, and matching on an inbound `Frame::Pong` instead of a callback.

use crate::command::{ChannelCommand, Delivery, HubCommand, Outbound, Path, SessionId};
use crate::error::TransportError;
use crate::hub::HubHandle;
use crate::ticker::Ticker;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace};

/// Maximum inbound payload size, matching `original_source/websocket.go`'s
/// `maxMessageSize`.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Read deadline, refreshed on every inbound pong. `original_source/websocket.go`'s
/// `pongWait`.
pub const PONG_WAIT: Duration = Duration::from_secs(30);

/// Heartbeat cadence: 90% of `PONG_WAIT`, so at least one ping lands inside
/// every read deadline window. `original_source/websocket.go`'s `pingPeriod`.
pub const PING_PERIOD: Duration = Duration::from_secs(27);

/// Write deadline applied to every outbound frame. `original_source/websocket.go`'s
/// `writeWait`.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// One frame crossing the wire in either direction. Stands in for
/// `gorilla/websocket`'s message-type constants plus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(Bytes),
    Ping,
    Pong,
    Close,
}

/// The stream interface a Session reads and writes through (§6). Implemented
/// for a real `axum` WebSocket by `pinghub-bin`; implemented for an in-memory
/// pair by this module's own tests.
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

pub trait TransportReader: Send + 'static {
    /// Read one frame, honoring `deadline` the way `websocket.go`'s
    /// `SetReadDeadline` does. `Ok(None)` signals a graceful close.
    fn recv(
        &mut self,
        deadline: Duration,
    ) -> impl std::future::Future<Output = Result<Option<Frame>, TransportError>> + Send;
}

pub trait TransportWriter: Send + 'static {
    fn send(
        &mut self,
        frame: Frame,
        deadline: Duration,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// Handle for the spawned reader/writer pair. Dropping it does not tear the
/// Session down -- only the transport erroring out or closing does; this just
/// lets a caller `.await` both tasks finishing, mirroring how
/// `original_source/conn.go`'s `run` is itself spawned as one goroutine per
/// connection.
pub struct Session {
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Perform the SUBSCRIBE handshake and spawn the reader and writer tasks
    /// for one connected client on `path`. Mirrors `conn.go`'s `run`: queue
    /// SUBSCRIBE, block on the control mailbox for the owning Channel, then
    /// start the writer and run the reader.
    #[instrument(skip(transport, hub, ticker), fields(%path))]
    pub async fn spawn<T: Transport>(
        transport: T,
        path: Path,
        hub: HubHandle,
        ticker: Ticker,
        metrics: std::sync::Arc<crate::metrics::Metrics>,
    ) -> Session {
        let (reader_half, writer_half) = transport.split();
        let session = SessionId::generate();

        // Capacity 256 per the Session entity in §3; this is the outbound
        // queue a Channel broadcasts onto and the reader echoes empty
        // payloads onto directly.
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (reply_tx, reply_rx) = oneshot::channel();

        metrics.websocket_connected();

        let _ = hub
            .enqueue(HubCommand::Subscribe {
                path: path.clone(),
                session,
                outbound: outbound_tx.clone(),
                reply: reply_tx,
            })
            .await;

        let channel = match reply_rx.await {
            Ok(channel) => channel,
            Err(_) => {
                // The Hub is gone (process shutting down). Nothing left to
                // subscribe to; close both halves and return a no-op pair.
                metrics.websocket_disconnected();
                let mut writer_half = writer_half;
                writer_half.close().await;
                return Session {
                    reader: tokio::spawn(async {}),
                    writer: tokio::spawn(async {}),
                };
            }
        };

        let writer = tokio::spawn(run_writer(writer_half, outbound_rx, ticker.subscribe()));
        let reader = tokio::spawn(run_reader(
            reader_half,
            path,
            session,
            channel,
            outbound_tx,
            metrics,
        ));

        Session { reader, writer }
    }

    /// Wait for both the reader and writer tasks to finish. Useful in tests
    /// and for graceful shutdown bookkeeping; not required for correct
    /// teardown, which happens on its own once either task exits.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

async fn run_reader<R: TransportReader>(
    mut reader: R,
    path: Path,
    session: SessionId,
    channel: crate::channel::ChannelHandle,
    self_outbound: Outbound,
    metrics: std::sync::Arc<crate::metrics::Metrics>,
) {
    debug!(%path, ?session, "reader started");

    // The read deadline is an absolute point in time, refreshed only when the
    // peer responds to a heartbeat (`Frame::Pong`) -- matching
    // `websocket.go`'s `SetPongHandler`, which resets the deadline from its
    // own callback, not from every successful read. A client that keeps
    // publishing ordinary frames but never acks a ping must still hit this
    // deadline.
    let mut pong_deadline = tokio::time::Instant::now() + PONG_WAIT;

    loop {
        let remaining = pong_deadline.saturating_duration_since(tokio::time::Instant::now());
        match reader.recv(remaining).await {
            Ok(Some(Frame::Text(payload))) => {
                if payload.len() > MAX_MESSAGE_SIZE {
                    let err = TransportError::PayloadTooLarge(MAX_MESSAGE_SIZE);
                    trace!(%path, ?session, %err, "oversized payload, closing");
                    break;
                }
                if payload.is_empty() {
                    // Echo-only: this never reaches the Channel, per §4.1's
                    // table and §4.3's reader spec.
                    let _ = self_outbound.send(Delivery::Message(payload)).await;
                } else {
                    metrics.websocketmsg();
                    if channel
                        .enqueue(ChannelCommand::Publish { payload })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
            Ok(Some(Frame::Pong)) => {
                pong_deadline = tokio::time::Instant::now() + PONG_WAIT;
                trace!(%path, ?session, "pong received, read deadline refreshed");
            }
            Ok(Some(Frame::Ping)) | Ok(Some(Frame::Close)) | Ok(None) => break,
            Err(_) => break,
        }
    }

    let _ = channel
        .enqueue(ChannelCommand::Unsubscribe { session })
        .await;
    metrics.websocket_disconnected();
    debug!(%path, ?session, "reader exiting");
}

async fn run_writer<W: TransportWriter>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Delivery>,
    mut heartbeat: crate::ticker::Subscription,
) {
    loop {
        tokio::select! {
            delivery = outbound.recv() => {
                match delivery {
                    Some(Delivery::Message(payload)) => {
                        if writer.send(Frame::Text(payload), WRITE_WAIT).await.is_err() {
                            break;
                        }
                    }
                    Some(Delivery::Closed) | None => {
                        let _ = writer.send(Frame::Close, WRITE_WAIT).await;
                        break;
                    }
                }
            }
            tick = heartbeat.tick() => {
                if tick.is_none() {
                    // The shared distributor stopped (process shutdown);
                    // nothing left to heartbeat against.
                    break;
                }
                if writer.send(Frame::Ping, WRITE_WAIT).await.is_err() {
                    break;
                }
            }
        }
    }
    writer.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// An in-memory `Transport` pair: an inbound queue the test feeds frames
    /// into, and an outbound queue the test drains to observe writes.
    struct MockTransport {
        inbound: mpsc::Receiver<Frame>,
        outbound: mpsc::Sender<Frame>,
    }

    struct MockReader(mpsc::Receiver<Frame>);
    struct MockWriter(mpsc::Sender<Frame>);

    impl Transport for MockTransport {
        type Reader = MockReader;
        type Writer = MockWriter;

        fn split(self) -> (Self::Reader, Self::Writer) {
            (MockReader(self.inbound), MockWriter(self.outbound))
        }
    }

    impl TransportReader for MockReader {
        async fn recv(&mut self, _deadline: Duration) -> Result<Option<Frame>, TransportError> {
            Ok(self.0.recv().await)
        }
    }

    impl TransportWriter for MockWriter {
        async fn send(&mut self, frame: Frame, _deadline: Duration) -> Result<(), TransportError> {
            self.0.send(frame).await.map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {}
    }

    fn mock_pair() -> (MockTransport, mpsc::Sender<Frame>, Arc<Mutex<mpsc::Receiver<Frame>>>) {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        (
            MockTransport { inbound: in_rx, outbound: out_tx },
            in_tx,
            Arc::new(Mutex::new(out_rx)),
        )
    }

    #[tokio::test]
    async fn empty_payload_is_echoed_not_broadcast() {
        let metrics = Arc::new(Metrics::new());
        let hub = crate::hub::spawn(metrics.clone());
        let ticker = Ticker::start(Duration::from_secs(3600));
        let (transport, inbound, outbound) = mock_pair();

        let session = Session::spawn(transport, Path::from("/x"), hub, ticker, metrics).await;

        inbound.send(Frame::Text(Bytes::new())).await.unwrap();

        let echoed = outbound.lock().await.recv().await.unwrap();
        assert_eq!(echoed, Frame::Text(Bytes::new()));

        drop(inbound);
        session.join().await;
    }

    #[tokio::test]
    async fn closing_inbound_tears_down_the_session() {
        let metrics = Arc::new(Metrics::new());
        let hub = crate::hub::spawn(metrics.clone());
        let ticker = Ticker::start(Duration::from_secs(3600));
        let (transport, inbound, outbound) = mock_pair();

        let session = Session::spawn(transport, Path::from("/x"), hub, ticker, metrics).await;
        drop(inbound);

        let close = outbound.lock().await.recv().await;
        assert_eq!(close, Some(Frame::Close));
        session.join().await;
    }
}
