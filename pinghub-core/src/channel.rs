//! The per-path Channel actor (§4.2).
//!
//! Ported control-flow from `original_source/channel.go`: `subscribe`,
//! `unsubscribe`, `publish` translate almost statement-for-statement. The one
//! behavioral generalization the expanded spec calls for is checking for an
//! empty subscriber set after *every* command, not just after `UNSUBSCRIBE`
//! -- so that evictions during a `BROADCAST` also retire the Channel (§4.2,
//! "a non-terminated empty Channel is acceptable transiently but not
//! persistently").
//!
//! Closing a subscriber's outbound queue has no explicit `close()` call the
//! way the Go original's `close(conn.send)` does: an explicit
//! `Delivery::Closed` item is pushed instead (see `command.rs`), since the
//! queue has two producers and dropping just this `Sender` clone wouldn't
//! close it.

use crate::command::{ChannelCommand, Delivery, Outbound, Path, SessionId};
use crate::hub::HubHandle;
use crate::metrics::Metrics;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

/// Mailbox capacity shared by every Channel and the Hub, per §3.
const MAILBOX_CAPACITY: usize = 16;

/// A cheap, cloneable reference to a live Channel's mailbox.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    path: Path,
    sender: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking forward, used by the Hub when delivering `SUBSCRIBE` (§4.1:
    /// "forward the SUBSCRIBE command into the Channel's mailbox").
    pub async fn enqueue(&self, cmd: ChannelCommand) -> Result<(), mpsc::error::SendError<ChannelCommand>> {
        self.sender.send(cmd).await
    }

    /// Non-blocking forward, used by the Hub when routing `PUBLISH` (§4.1):
    /// a full or closed mailbox is the Hub's signal to evict the path
    /// instead of waiting.
    pub fn try_enqueue(&self, cmd: ChannelCommand) -> Result<(), mpsc::error::TrySendError<ChannelCommand>> {
        self.sender.try_send(cmd)
    }
}

struct Channel {
    path: Path,
    mailbox: mpsc::Receiver<ChannelCommand>,
    subscribers: HashMap<SessionId, Outbound>,
    hub: HubHandle,
    metrics: Arc<Metrics>,
}

impl Channel {
    /// Create the Channel for `path` and start its task. Mirrors
    /// `original_source/hub.go`'s `newChannel` + `go h.channels[path].run()`.
    pub fn spawn(path: Path, hub: HubHandle, metrics: Arc<Metrics>) -> ChannelHandle {
        let (sender, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        metrics.channel_opened();

        let channel = Channel {
            path: path.clone(),
            mailbox,
            subscribers: HashMap::new(),
            hub,
            metrics,
        };
        tokio::spawn(channel.run());

        ChannelHandle { path, sender }
    }

    #[instrument(skip(self), fields(path = %self.path))]
    async fn run(mut self) {
        debug!("channel started");
        while let Some(cmd) = self.mailbox.recv().await {
            match cmd {
                ChannelCommand::Subscribe { session, outbound } => {
                    self.subscribe(session, outbound);
                }
                ChannelCommand::Unsubscribe { session } => {
                    self.unsubscribe(session);
                }
                ChannelCommand::Publish { payload } => {
                    self.publish(payload);
                }
            }

            // A BROADCAST eviction or an UNSUBSCRIBE may have just emptied
            // the subscriber set; either way, an empty Channel doesn't
            // persist past this point in the loop.
            if self.subscribers.is_empty() {
                break;
            }
        }
        self.terminate().await;
    }

    fn subscribe(&mut self, session: SessionId, outbound: Outbound) {
        // No-op if already present, per the idempotence invariant in §8.
        self.subscribers.entry(session).or_insert(outbound);
        trace!(subscribers = self.subscribers.len(), "subscribed");
    }

    fn unsubscribe(&mut self, session: SessionId) {
        if let Some(outbound) = self.subscribers.remove(&session) {
            // Best-effort: if the writer's queue is already full or its
            // Receiver is gone, there's nothing more to signal.
            let _ = outbound.try_send(Delivery::Closed);
            trace!(subscribers = self.subscribers.len(), "unsubscribed");
        }
    }

    fn publish(&mut self, payload: Bytes) {
        // Empty payloads from one-shot publishers are dropped here; a
        // streaming client's own empty payload never reaches the Channel --
        // the Session echoes it locally instead (§4.1 table).
        if payload.is_empty() {
            return;
        }
        self.broadcast(payload);
    }

    fn broadcast(&mut self, payload: Bytes) {
        let mut evict = Vec::new();
        for (&session, outbound) in &self.subscribers {
            match outbound.try_send(Delivery::Message(payload.clone())) {
                Ok(()) => self.metrics.send(),
                Err(_) => evict.push(session),
            }
        }
        for session in evict {
            trace!(?session, "evicting slow subscriber");
            if let Some(outbound) = self.subscribers.remove(&session) {
                let _ = outbound.try_send(Delivery::Closed);
            }
        }
    }

    async fn terminate(self) {
        debug!("channel terminating, subscriber set empty");
        self.metrics.channel_closed();
        // `mailbox` (the Receiver) is dropped along with `self` here, which
        // is how any commands already buffered by a concurrent sender are
        // discarded, per §3's lifecycle note.
        let _ = self.hub.enqueue(crate::command::HubCommand::Remove { path: self.path }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Delivery;

    async fn outbound_pair() -> (Outbound, mpsc::Receiver<Delivery>) {
        mpsc::channel(256)
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_idempotent() {
        let metrics = Arc::new(Metrics::new());
        let hub = crate::hub::spawn(metrics.clone());
        let handle = Channel::spawn(Path::from("/x"), hub, metrics);

        let session = SessionId::generate();
        let (tx, mut rx) = outbound_pair().await;
        handle
            .enqueue(ChannelCommand::Subscribe { session, outbound: tx.clone() })
            .await
            .unwrap();
        handle
            .enqueue(ChannelCommand::Subscribe { session, outbound: tx })
            .await
            .unwrap();

        // If the duplicate SUBSCRIBE had inserted a second entry for the
        // same session, this broadcast would deliver the payload twice.
        handle
            .enqueue(ChannelCommand::Publish { payload: Bytes::from_static(b"hi") })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Delivery::Message(payload)) => assert_eq!(payload, Bytes::from_static(b"hi")),
            other => panic!("expected exactly one message, got {other:?}"),
        }
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv())
                .await
                .is_err(),
            "duplicate subscribe must not deliver the broadcast twice"
        );
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_not_the_message() {
        let metrics = Arc::new(Metrics::new());
        let hub = crate::hub::spawn(metrics.clone());
        let handle = Channel::spawn(Path::from("/x"), hub, metrics);

        let fast = SessionId::generate();
        let (fast_tx, mut fast_rx) = mpsc::channel(256);
        let slow = SessionId::generate();
        let (slow_tx, _slow_rx) = mpsc::channel(1);

        handle
            .enqueue(ChannelCommand::Subscribe { session: fast, outbound: fast_tx })
            .await
            .unwrap();
        handle
            .enqueue(ChannelCommand::Subscribe { session: slow, outbound: slow_tx })
            .await
            .unwrap();

        // Fill the slow subscriber's single-capacity queue, then send 257
        // more messages: the slow one gets evicted but the fast one sees
        // everything, per scenario S3.
        for i in 0..258 {
            handle
                .enqueue(ChannelCommand::Publish {
                    payload: Bytes::from(format!("m{i}")),
                })
                .await
                .unwrap();
        }

        let mut received = 0;
        while fast_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 258);
    }
}
