//! Shared periodic tick distributor (§4.4): one `tokio::time::interval`
//! multiplexed out to every Session writer's heartbeat, instead of one timer
//! slot per Session.
//!
//! Ported structurally from `original_source/mticker.go`'s `mTicker`: a
//! `subscribe`/`unsubscribe`/`stop` contract, a mutex-guarded subscriber map,
//! and drop-on-full fan-out on every tick. The Go version splits its state
//! across `mux` (subscriber map) and `tickerMux` (start/stop); here the timer
//! itself lives entirely inside the single distributor task spawned by
//! `Ticker::start`, so only the subscriber map needs a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::time::{Duration, Instant};
use tracing::debug;

type SubscriberId = u64;

/// A per-subscriber handle to the shared tick stream. Dropping it without
/// calling `Ticker::unsubscribe` first just leaks the map entry until the
/// ticker is stopped; Session always unsubscribes on writer exit, mirroring
/// the original's deferred `mTicker.unsubscribe`.
pub struct Subscription {
    id: SubscriberId,
    ticker: Ticker,
    receiver: mpsc::Receiver<Instant>,
}

impl Subscription {
    /// Wait for the next heartbeat tick. Ticks that arrive while this isn't
    /// being polled are simply missed -- see `Ticker`'s distribution policy.
    /// Returns `None` once `Ticker::stop` has closed every subscriber stream,
    /// which the Session writer treats the same as its outbound queue
    /// closing: time to exit.
    pub async fn tick(&mut self) -> Option<Instant> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.ticker.unsubscribe(self.id);
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: SubscriberId,
    senders: HashMap<SubscriberId, mpsc::Sender<Instant>>,
}

/// Handle to the running distributor task. Cheap to clone; every clone
/// shares the same subscriber map and the same underlying timer.
#[derive(Clone)]
pub struct Ticker {
    subscribers: Arc<Mutex<Subscribers>>,
    dropped: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
}

impl Ticker {
    /// Start the distributor task on the given period and return a handle to
    /// it. The task runs until `stop` is called, or the process exits.
    pub fn start(period: Duration) -> Ticker {
        let subscribers = Arc::new(Mutex::new(Subscribers::default()));
        let dropped = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(Notify::new());

        let task_subscribers = subscribers.clone();
        let task_dropped = dropped.clone();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; the spec's heartbeat cadence
            // starts one period after the Session subscribes, so discard it.
            interval.tick().await;
            loop {
                tokio::select! {
                    now = interval.tick() => {
                        let subs = task_subscribers.lock().unwrap();
                        for sender in subs.senders.values() {
                            if sender.try_send(now).is_err() {
                                task_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    () = task_shutdown.notified() => break,
                }
            }
            // Dropping every sender closes each Subscription's receiver, per
            // §4.4's "closes all subscriber streams".
            task_subscribers.lock().unwrap().senders.clear();
            debug!("ticker stopped");
        });

        Ticker { subscribers, dropped, shutdown }
    }

    /// Stop the underlying timer and close every subscriber's tick stream,
    /// per §4.4. Idempotent: a second call is a harmless extra wakeup of a
    /// task that has already exited its loop.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Returns a handle exposing a tick stream of capacity 1, per §4.4.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(1);
        let mut subs = self.subscribers.lock().unwrap();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.senders.insert(id, tx);

        Subscription {
            id,
            ticker: self.clone(),
            receiver: rx,
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().senders.remove(&id);
    }

    /// Number of ticks dropped so far because a subscriber's stream was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        debug!(dropped = self.dropped(), "ticker handle dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test(start_paused = true)]
    async fn subscribers_receive_ticks_in_order() {
        let ticker = Ticker::start(StdDuration::from_millis(10));
        let mut sub = ticker.subscribe();

        let first = sub.tick().await.unwrap();
        let second = sub.tick().await.unwrap();
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_misses_ticks_but_is_not_dropped() {
        let ticker = Ticker::start(StdDuration::from_millis(10));
        let mut sub = ticker.subscribe();

        // Let several ticks fire without polling the subscription.
        tokio::time::advance(StdDuration::from_millis(55)).await;
        tokio::task::yield_now().await;

        // Still subscribed: a single `tick()` call succeeds.
        assert!(sub.tick().await.is_some());
        assert!(ticker.dropped() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_on_drop_removes_the_subscriber() {
        let ticker = Ticker::start(StdDuration::from_millis(10));
        {
            let _sub = ticker.subscribe();
            assert_eq!(ticker.subscribers.lock().unwrap().senders.len(), 1);
        }
        assert_eq!(ticker.subscribers.lock().unwrap().senders.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_every_subscriber_stream() {
        let ticker = Ticker::start(StdDuration::from_millis(10));
        let mut sub = ticker.subscribe();

        ticker.stop();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(sub.tick().await, None);
    }
}
