//! The Hub actor (§4.1): the single authority for the path → Channel map.
//!
//! Ported control-flow from `original_source/hub.go`'s `run`/`remove`. The
//! "any other kind" fatal-error branch in the spec has no counterpart here:
//! `HubCommand` is an exhaustive enum, so the compiler -- not a runtime
//! `panic!` -- is what rules out an unknown command kind.

use crate::channel::{Channel, ChannelHandle};
use crate::command::{HubCommand, Path};
use crate::metrics::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

const MAILBOX_CAPACITY: usize = 16;

/// A cheap, cloneable reference to the process-wide Hub's mailbox. This is
/// the single entry point named in §6: `enqueue(Command)`.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Submit a command to the Hub, waiting if its mailbox is momentarily
    /// full. Used by the one-shot publish handler and by a Session at
    /// startup, per §6.
    pub async fn enqueue(&self, cmd: HubCommand) -> Result<(), mpsc::error::SendError<HubCommand>> {
        self.sender.send(cmd).await
    }
}

struct Hub {
    mailbox: mpsc::Receiver<HubCommand>,
    channels: HashMap<Path, ChannelHandle>,
    metrics: Arc<Metrics>,
    // A handle to itself, cloned into every Channel it spawns so they can
    // send REMOVE back on termination.
    self_handle: HubHandle,
}

impl Hub {
    /// Start the Hub task and return a handle to it. Process-wide singleton:
    /// callers are expected to spawn exactly one and share the handle.
    pub fn spawn(metrics: Arc<Metrics>) -> HubHandle {
        let (sender, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let self_handle = HubHandle { sender: sender.clone() };

        let hub = Hub {
            mailbox,
            channels: HashMap::new(),
            metrics,
            self_handle: self_handle.clone(),
        };
        tokio::spawn(hub.run());

        self_handle
    }

    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("hub started");
        while let Some(cmd) = self.mailbox.recv().await {
            match cmd {
                HubCommand::Subscribe { path, session, outbound, reply } => {
                    self.subscribe(path, session, outbound, reply).await;
                }
                HubCommand::Publish { path, payload } => {
                    self.publish(path, payload);
                }
                HubCommand::Remove { path } => {
                    self.remove(&path);
                }
            }
        }
        debug!("hub mailbox closed, shutting down");
    }

    async fn subscribe(
        &mut self,
        path: Path,
        session: crate::command::SessionId,
        outbound: crate::command::Outbound,
        reply: tokio::sync::oneshot::Sender<ChannelHandle>,
    ) {
        let handle = self
            .channels
            .entry(path.clone())
            .or_insert_with(|| {
                Channel::spawn(path.clone(), self.self_handle.clone(), self.metrics.clone())
            })
            .clone();

        // The session may have given up waiting (e.g. it disconnected
        // mid-handshake); that's fine, the SUBSCRIBE is still forwarded so
        // the Channel's state stays consistent with what it will shortly be
        // told to unsubscribe.
        let _ = reply.send(handle.clone());

        if let Err(err) = handle
            .enqueue(crate::command::ChannelCommand::Subscribe { session, outbound })
            .await
        {
            warn!(%path, %err, "failed to forward SUBSCRIBE into channel mailbox");
        }
    }

    fn publish(&mut self, path: Path, payload: bytes::Bytes) {
        let Some(handle) = self.channels.get(&path) else {
            trace!(%path, "publish to unknown path, dropping");
            self.metrics.drop();
            return;
        };

        match handle.try_enqueue(crate::command::ChannelCommand::Publish { payload }) {
            Ok(()) => {}
            Err(_) => {
                // Full or closed: the channel is saturated or terminating.
                // Don't block; reclaim the path instead (§4.1, §9).
                trace!(%path, "channel mailbox saturated, removing path");
                self.metrics.drop();
                self.channels.remove(&path);
            }
        }
    }

    fn remove(&mut self, path: &Path) {
        self.channels.remove(path);
    }
}

/// Spawn the process-wide Hub and return a handle to it.
pub fn spawn(metrics: Arc<Metrics>) -> HubHandle {
    Hub::spawn(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ChannelCommand, SessionId};
    use bytes::Bytes;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn publish_to_unknown_path_is_dropped_silently() {
        let metrics = Arc::new(Metrics::new());
        let hub = spawn(metrics);

        // Should simply return; there's no subscriber to observe anything,
        // so the only assertion possible is that this doesn't hang or panic.
        hub.enqueue(HubCommand::Publish {
            path: Path::from("/nobody"),
            payload: Bytes::from_static(b"hello"),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn subscribe_creates_channel_and_delivers_handle_once() {
        let metrics = Arc::new(Metrics::new());
        let hub = spawn(metrics);

        let (outbound, _rx) = mpsc::channel(256);
        let (reply_tx, reply_rx) = oneshot::channel();

        hub.enqueue(HubCommand::Subscribe {
            path: Path::from("/x"),
            session: SessionId::generate(),
            outbound,
            reply: reply_tx,
        })
        .await
        .unwrap();

        let channel = reply_rx.await.expect("hub must reply exactly once");
        assert_eq!(channel.path().as_str(), "/x");
    }

    #[tokio::test]
    async fn remove_then_publish_drops_silently() {
        let metrics = Arc::new(Metrics::new());
        let hub = spawn(metrics);

        let (outbound, rx) = mpsc::channel(256);
        let (reply_tx, reply_rx) = oneshot::channel();
        let session = SessionId::generate();

        hub.enqueue(HubCommand::Subscribe {
            path: Path::from("/x"),
            session,
            outbound,
            reply: reply_tx,
        })
        .await
        .unwrap();
        let channel = reply_rx.await.unwrap();
        drop(rx);

        channel
            .enqueue(ChannelCommand::Unsubscribe { session })
            .await
            .unwrap();

        // Give the Channel task a chance to observe the empty set, tear
        // down, and send REMOVE back to the Hub.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        hub.enqueue(HubCommand::Publish {
            path: Path::from("/x"),
            payload: Bytes::from_static(b"late"),
        })
        .await
        .unwrap();
    }
}
