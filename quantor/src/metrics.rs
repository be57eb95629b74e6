use crate::event::{MetricFilter, StampedEvent};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::sync::Notify;
use tracing::debug;

/// Lock-free-for-producers fan-out of [`StampedEvent`]s to many subscribers.
///
/// `publish` never blocks and never awaits: each matching subscriber's bounded ring takes the
/// event under a short non-suspending lock, dropping its oldest entry (and counting the drop)
/// when full. A slow dashboard can therefore never stall the trading hot path.
///
/// Ordering: per producer, every subscriber observes events in publish order; no total order
/// exists across producers. The bus is not a reliable channel - dropped events are recoverable
/// from the journal, not from memory.
#[derive(Debug, Clone, Default)]
pub struct MetricsBus {
    inner: Arc<BusInner>,
}

#[derive(Debug, Default)]
struct BusInner {
    subscribers: Mutex<Vec<Arc<SubscriberState>>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct SubscriberState {
    id: u64,
    filter: MetricFilter,
    capacity: usize,
    ring: Mutex<VecDeque<StampedEvent>>,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

/// Consuming side of one subscription. Dropping the stream unsubscribes.
#[derive(Debug)]
pub struct MetricStream {
    bus: Arc<BusInner>,
    state: Arc<SubscriberState>,
}

impl MetricsBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every subscriber whose filter matches. Never blocks.
    pub fn publish(&self, event: &StampedEvent) {
        let subscribers = self.inner.subscribers.lock();
        for subscriber in subscribers.iter() {
            if subscriber.closed.load(Ordering::Acquire) || !subscriber.filter.matches(event) {
                continue;
            }

            {
                let mut ring = subscriber.ring.lock();
                if ring.len() >= subscriber.capacity {
                    // Bounded ring: the oldest event is dropped for this subscriber only.
                    ring.pop_front();
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                }
                ring.push_back(event.clone());
            }
            subscriber.notify.notify_one();
        }
    }

    /// Subscribe with a publisher-side `filter` and a bounded ring of `capacity` events.
    pub fn subscribe(&self, filter: MetricFilter, capacity: usize) -> MetricStream {
        let state = Arc::new(SubscriberState {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            filter,
            capacity: capacity.max(1),
            ring: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        });
        self.inner.subscribers.lock().push(Arc::clone(&state));

        MetricStream {
            bus: Arc::clone(&self.inner),
            state,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl BusInner {
    /// Idempotent removal; pending events are simply discarded with the state.
    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(index) = subscribers.iter().position(|s| s.id == id) {
            let state = subscribers.swap_remove(index);
            state.closed.store(true, Ordering::Release);
            state.notify.notify_waiters();
            debug!(subscriber = id, "metrics subscriber removed");
        }
    }
}

impl MetricStream {
    /// Receive the next event, awaiting if the ring is empty. Returns `None` once the stream
    /// is unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<StampedEvent> {
        loop {
            if let Some(event) = self.state.ring.lock().pop_front() {
                return Some(event);
            }
            if self.state.closed.load(Ordering::Acquire) {
                return None;
            }
            self.state.notify.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<StampedEvent> {
        self.state.ring.lock().pop_front()
    }

    /// Events dropped for this subscriber because its ring was full.
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    /// Events currently buffered.
    pub fn len(&self) -> usize {
        self.state.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.ring.lock().is_empty()
    }

    /// Explicit unsubscribe; also performed on drop. Idempotent.
    pub fn unsubscribe(&self) {
        self.bus.unsubscribe(self.state.id);
    }
}

impl Drop for MetricStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.state.id);
    }
}
