//! The engine behind an ephemeral, path-keyed publish/subscribe bus.
//!
//! The major components are:
//! * `hub`: the single process-wide actor owning the path -> Channel map.
//! * `channel`: the per-path actor that fans a publish out to its subscribers.
//! * `session`: the reader/writer pair that drives one subscriber's transport.
//! * `ticker`: the shared heartbeat distributor every Session writer draws from.
//! * `command`: the mailbox vocabulary the Hub and every Channel speak.
//! * `metrics`: in-process counters, rendered by `pinghub-bin`'s reporter.

#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

pub mod channel;
pub mod command;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod session;
pub mod ticker;

pub use channel::ChannelHandle;
pub use command::{ChannelCommand, Delivery, HubCommand, Outbound, Path, SessionId};
pub use error::{Error, Result, TransportError};
pub use hub::HubHandle;
pub use metrics::Metrics;
pub use session::{Frame, Session, Transport, TransportReader, TransportWriter};
pub use ticker::{Subscription, Ticker};
