//! Error types for the engine.
//!
//! The teacher keeps it to a single boxed `dyn std::error::Error` alias
//! (`lib.rs`). The engine here has exactly one fallible boundary worth naming
//! -- the transport a Session reads and writes through -- so a small
//! `thiserror` enum is used for that instead of boxing everything, while
//! still exposing the same boxed-error `Result` alias for anything that
//! doesn't need to match on a specific variant.

/// Errors a `Transport` implementation may report back to a Session.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("read deadline exceeded")]
    ReadTimeout,
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("peer sent a payload larger than the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Catch-all boxed error, matching the teacher's `lib.rs` alias.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;
