//! The command vocabulary that flows through the Hub's and every Channel's
//! mailboxes.
//!
//! The distilled spec describes a single uniform `Command` record shared by
//! both actors. Rust's ownership rules make that awkward in one spot: the
//! one-shot reply channel used to hand a session its `ChannelHandle` is only
//! ever consumed by the Hub, never forwarded on to the Channel. Rather than
//! carry a field that's `None` half the time, this splits the vocabulary into
//! `HubCommand` (what arrives on the Hub's mailbox) and `ChannelCommand`
//! (what arrives on a Channel's mailbox) -- the same five kinds from the spec,
//! just partitioned by which actor actually handles them. `BROADCAST` has no
//! mailbox variant at all: nothing outside a Channel ever constructs one, so
//! it is simply the internal method `Channel::broadcast`.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A validated, opaque topic identifier. Cheap to clone: it's a reference
/// counted string under the hood, mirroring how both the Hub and every
/// Channel pass paths around without ever mutating them.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Path(Arc<str>);

impl Path {
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Path(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path(Arc::from(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path(Arc::from(s))
    }
}

/// Identifies one Session within a Channel's subscriber set. Stands in for
/// the Go original's use of the `*connection` pointer as a map key.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Allocate a new, process-unique session id.
    pub fn generate() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An item delivered on a subscriber's outbound queue.
///
/// The Go original closes `conn.send` to tell the writer no more messages
/// are coming, relying on a single owner of the channel. Here the Session
/// reader also needs to push onto this same queue directly, to echo its own
/// empty payloads without going through the Channel's broadcast path (§4.3) --
/// so the queue has two producers (the Channel and the Session reader), and
/// an explicit `Closed` item stands in for Go's channel-close signal instead
/// of relying on every `Sender` clone being dropped.
#[derive(Debug, Clone)]
pub enum Delivery {
    Message(Bytes),
    Closed,
}

/// The sending half of a subscriber's outbound queue, capacity 256 per the
/// spec's Session entity. The Channel holds one clone to broadcast onto; the
/// Session reader holds another to echo empty payloads onto directly.
pub type Outbound = mpsc::Sender<Delivery>;

/// Commands accepted on the Hub's mailbox.
pub enum HubCommand {
    /// A Session wants to join `path`. `reply` is the Session's one-shot
    /// control mailbox: the Hub sends the owning `ChannelHandle` through it
    /// exactly once.
    Subscribe {
        path: Path,
        session: SessionId,
        outbound: Outbound,
        reply: oneshot::Sender<crate::channel::ChannelHandle>,
    },
    /// A one-shot publisher (or anything outside the Channel's own Session
    /// set) wants to deliver `payload` to `path`.
    Publish { path: Path, payload: Bytes },
    /// A Channel has become empty and is tearing itself down.
    Remove { path: Path },
}

impl fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubCommand::Subscribe { path, session, .. } => f
                .debug_struct("Subscribe")
                .field("path", path)
                .field("session", session)
                .finish(),
            HubCommand::Publish { path, payload } => f
                .debug_struct("Publish")
                .field("path", path)
                .field("len", &payload.len())
                .finish(),
            HubCommand::Remove { path } => f.debug_struct("Remove").field("path", path).finish(),
        }
    }
}

/// Commands accepted on a single Channel's mailbox.
#[derive(Debug)]
pub enum ChannelCommand {
    Subscribe {
        session: SessionId,
        outbound: Outbound,
    },
    Unsubscribe {
        session: SessionId,
    },
    Publish {
        payload: Bytes,
    },
}
