//! In-process counters observed by the engine, reported externally by
//! `pinghub-bin`'s plaintext TCP reporter.
//!
//! Ported from `go-metrics`-backed `metrics.go` in the original implementation.
//! That registry abstraction (counters and meters looked up by name, rendered
//! generically) isn't worth its weight for six fixed names, so this is a
//! plain struct of atomics instead -- the engine's only shared mutable state
//! besides the tick distributor's subscriber map.

use std::sync::atomic::{AtomicI64, Ordering};

/// `websockets` and `channels` are gauges (can go up and down); the rest are
/// monotonic counters the reporter exposes as rates upstream, mirroring the
/// original's `incr`/`mark` split between `gometrics.Counter` and
/// `gometrics.Meter`.
#[derive(Default, Debug)]
pub struct Metrics {
    websockets: AtomicI64,
    channels: AtomicI64,
    postmsgs: AtomicI64,
    websocketmsgs: AtomicI64,
    drops: AtomicI64,
    sends: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn websocket_connected(&self) {
        self.websockets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_disconnected(&self) {
        self.websockets.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn channel_opened(&self) {
        self.channels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_closed(&self) {
        self.channels.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn postmsg(&self) {
        self.postmsgs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocketmsg(&self) {
        self.websocketmsgs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send(&self) {
        self.sends.fetch_add(1, Ordering::Relaxed);
    }

    /// Render every counter as `name.value N` lines, the same shape the
    /// original's `report` method writes to a freshly accepted TCP
    /// connection.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("websockets", self.websockets.load(Ordering::Relaxed)),
            ("channels", self.channels.load(Ordering::Relaxed)),
            ("postmsgs", self.postmsgs.load(Ordering::Relaxed)),
            ("websocketmsgs", self.websocketmsgs.load(Ordering::Relaxed)),
            ("drops", self.drops.load(Ordering::Relaxed)),
            ("sends", self.sends.load(Ordering::Relaxed)),
        ] {
            out.push_str(&format!("{name}.value {value}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reflects_counter_state() {
        let m = Metrics::new();
        m.websocket_connected();
        m.websocket_connected();
        m.websocket_disconnected();
        m.drop();

        let report = m.report();
        assert!(report.contains("websockets.value 1"));
        assert!(report.contains("drops.value 1"));
        assert!(report.contains("sends.value 0"));
    }
}
