//! In-memory per-task event pub/sub with bounded replay buffers.
//!
//! One broadcaster instance serves the whole process. Subscribers get a
//! bounded channel per task; publishing never blocks on a slow subscriber
//! (non-blocking try-send), and late subscribers are caught up by a
//! synchronous replay of the task's buffered events. Buffers are capped at
//! 200 events (overflow dropped, not rotated) and evicted 10 minutes after
//! creation by a periodic sweeper.

pub mod event;

pub use event::TaskEvent;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Max events buffered per task for late-subscriber replay.
const MAX_EVENT_BUFFER: usize = 200;
/// Per-subscriber channel capacity.
const SUBSCRIBER_CAPACITY: usize = 200;
/// Buffers older than this are removed by the sweeper.
const BUFFER_TTL: Duration = Duration::from_secs(10 * 60);
/// Sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct EventBuffer {
    events: Vec<TaskEvent>,
    created_at: Instant,
}

struct SubscriberEntry {
    id: u64,
    tx: mpsc::Sender<TaskEvent>,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<u64, Vec<SubscriberEntry>>,
    buffers: HashMap<u64, EventBuffer>,
}

/// Handle returned by [`EventBroadcaster::subscribe`]. Dropping it alone
/// does not detach the sender side; call
/// [`EventBroadcaster::unsubscribe`] on every exit path.
pub struct Subscription {
    pub task_id: u64,
    id: u64,
    rx: mpsc::Receiver<TaskEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TaskEvent> {
        self.rx.try_recv().ok()
    }
}

/// Per-task event fan-out. The maps live under a plain mutex: nothing
/// awaits while holding it, and sends use `try_send`, so the publisher
/// path never blocks beyond the buffer-append critical section.
pub struct EventBroadcaster {
    inner: Mutex<Inner>,
    next_subscriber_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to a task's events. Buffered events are replayed into the
    /// new channel before this returns; if the channel fills during
    /// replay, the remaining buffered events are dropped for this
    /// subscriber (ordering of delivered events is preserved).
    pub fn subscribe(&self, task_id: u64) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock().expect("broadcaster lock poisoned");
        if let Some(buf) = inner.buffers.get(&task_id) {
            for (i, event) in buf.events.iter().enumerate() {
                if tx.try_send(event.clone()).is_err() {
                    warn!(
                        task_id,
                        skipped = buf.events.len() - i,
                        "subscriber channel full during replay"
                    );
                    break;
                }
            }
        }
        inner
            .subscribers
            .entry(task_id)
            .or_default()
            .push(SubscriberEntry { id, tx });
        debug!(
            task_id,
            subscribers = inner.subscribers[&task_id].len(),
            "new subscriber"
        );

        Subscription { task_id, id, rx }
    }

    /// Remove a subscriber's channel. The buffer entry stays; it is only
    /// removed by [`clear_buffer`](Self::clear_buffer) or the sweeper.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.inner.lock().expect("broadcaster lock poisoned");
        if let Some(subs) = inner.subscribers.get_mut(&subscription.task_id) {
            subs.retain(|entry| entry.id != subscription.id);
            if subs.is_empty() {
                inner.subscribers.remove(&subscription.task_id);
            }
        }
    }

    /// Publish an event: stamp the timestamp, append it to the task's
    /// replay buffer (dropped once the 200-event cap is reached), then
    /// try-send to every subscriber. A full subscriber channel skips that
    /// subscriber for this event; the publisher never waits.
    pub fn broadcast(&self, mut event: TaskEvent) {
        event.timestamp = Utc::now();
        let task_id = event.task_id;

        let senders: Vec<mpsc::Sender<TaskEvent>> = {
            let mut inner = self.inner.lock().expect("broadcaster lock poisoned");
            let buf = inner.buffers.entry(task_id).or_insert_with(|| EventBuffer {
                events: Vec::with_capacity(MAX_EVENT_BUFFER),
                created_at: Instant::now(),
            });
            if buf.events.len() < MAX_EVENT_BUFFER {
                buf.events.push(event.clone());
            }
            inner
                .subscribers
                .get(&task_id)
                .map(|subs| subs.iter().map(|entry| entry.tx.clone()).collect())
                .unwrap_or_default()
        };

        for tx in senders {
            if tx.try_send(event.clone()).is_err() {
                debug!(task_id, "subscriber channel full, skipping event");
            }
        }
    }

    /// Drop a task's replay buffer.
    pub fn clear_buffer(&self, task_id: u64) {
        let mut inner = self.inner.lock().expect("broadcaster lock poisoned");
        inner.buffers.remove(&task_id);
    }

    /// Remove buffers older than the TTL.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().expect("broadcaster lock poisoned");
        let before = inner.buffers.len();
        inner
            .buffers
            .retain(|_, buf| buf.created_at.elapsed() <= BUFFER_TTL);
        let removed = before - inner.buffers.len();
        if removed > 0 {
            debug!(removed, "swept expired event buffers");
        }
    }

    /// Spawn the periodic buffer sweeper.
    pub fn start_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broadcaster = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                broadcaster.sweep();
            }
        })
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(task_id: u64, content: &str) -> TaskEvent {
        TaskEvent::log(task_id, "info", content, None, 0, "running")
    }

    #[tokio::test]
    async fn subscriber_sees_events_in_publish_order() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe(1);

        for i in 0..5 {
            broadcaster.broadcast(event(1, &format!("e{i}")));
        }

        for i in 0..5 {
            let got = sub.recv().await.unwrap();
            assert_eq!(got.content, format!("e{i}"));
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn events_are_scoped_to_task() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe(1);

        broadcaster.broadcast(event(2, "other"));
        broadcaster.broadcast(event(1, "mine"));

        assert_eq!(sub.recv().await.unwrap().content, "mine");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_then_live_events() {
        let broadcaster = EventBroadcaster::new();
        for i in 0..5 {
            broadcaster.broadcast(event(7, &format!("e{i}")));
        }

        let mut sub = broadcaster.subscribe(7);
        broadcaster.broadcast(event(7, "e5"));
        broadcaster.broadcast(event(7, "e6"));

        for i in 0..7 {
            let got = sub.recv().await.unwrap();
            assert_eq!(got.content, format!("e{i}"));
        }
    }

    #[tokio::test]
    async fn buffer_drops_overflow_instead_of_rotating() {
        let broadcaster = EventBroadcaster::new();
        for i in 0..250 {
            broadcaster.broadcast(event(3, &format!("e{i}")));
        }

        // Replay carries the first 200 events, not the most recent 200.
        let mut sub = broadcaster.subscribe(3);
        let mut seen = 0;
        while let Some(got) = sub.try_recv() {
            assert_eq!(got.content, format!("e{seen}"));
            seen += 1;
        }
        assert_eq!(seen, MAX_EVENT_BUFFER);
    }

    #[tokio::test]
    async fn full_subscriber_skips_then_recovers() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe(4);

        // Overfill the channel without draining; the publisher must not block.
        for i in 0..SUBSCRIBER_CAPACITY + 5 {
            broadcaster.broadcast(event(4, &format!("e{i}")));
        }

        let mut seen = 0;
        while sub.try_recv().is_some() {
            seen += 1;
        }
        assert_eq!(seen, SUBSCRIBER_CAPACITY);

        // Drained: the next broadcast is delivered again.
        broadcaster.broadcast(event(4, "after"));
        assert_eq!(sub.recv().await.unwrap().content, "after");
    }

    #[tokio::test]
    async fn unsubscribe_closes_channel_and_keeps_buffer() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe(5);
        broadcaster.broadcast(event(5, "before"));
        broadcaster.unsubscribe(&sub);

        assert_eq!(sub.recv().await.unwrap().content, "before");
        assert!(sub.recv().await.is_none());

        // Buffer survives unsubscribe; a new subscriber still gets replay.
        let mut sub2 = broadcaster.subscribe(5);
        assert_eq!(sub2.try_recv().unwrap().content, "before");
    }

    #[tokio::test]
    async fn clear_buffer_removes_replay() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(event(6, "gone"));
        broadcaster.clear_buffer(6);

        let mut sub = broadcaster.subscribe(6);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_expired_buffers() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(event(8, "old"));

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        broadcaster.broadcast(event(9, "fresh"));
        broadcaster.sweep();

        let mut old = broadcaster.subscribe(8);
        assert!(old.try_recv().is_none());
        let mut fresh = broadcaster.subscribe(9);
        assert_eq!(fresh.try_recv().unwrap().content, "fresh");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let broadcaster = EventBroadcaster::new();
        let mut a = broadcaster.subscribe(10);
        let mut b = broadcaster.subscribe(10);

        broadcaster.broadcast(event(10, "shared"));
        assert_eq!(a.recv().await.unwrap().content, "shared");
        assert_eq!(b.recv().await.unwrap().content, "shared");
    }
}
