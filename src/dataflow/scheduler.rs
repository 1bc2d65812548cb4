//! Push-event scheduling.
//!
//! Every push delivery goes through an [`EventQueue`] shared by all
//! components of a network. Events are ordered by (consumer priority,
//! sequence number):
//!
//! - the sequence number is assigned when the event is queued, so events on
//!   one edge are delivered in the order the producer sent them;
//! - the priority of a consumer port is its component's depth in the push
//!   graph, raised above any edge it is configured to be delivered after.
//!   When one `send` fans out to several consumers, upstream consumers run
//!   first and a diamond delivers to its join only after both branches.
//!
//! # Dispatch modes
//!
//! - [`DispatchMode::Inline`] (default): the sending thread drains the queue
//!   unless a drain is already running. Sends made from inside a handler
//!   only enqueue; the active drain picks them up, so the graph runs to
//!   quiescence without recursion. A send from another thread while a drain
//!   is active returns immediately and its events are delivered by the
//!   draining thread.
//! - [`DispatchMode::Worker`]: a dedicated dispatcher thread drains; `send`
//!   never runs handlers.

use super::worker::Worker;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// How queued push events are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Inline,
    Worker,
}

/// Deferred delivery of one measurement to one consumer.
pub type Delivery = Box<dyn FnOnce() + Send>;

struct QueuedEvent {
    priority: u32,
    seq: u64,
    deliver: Delivery,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq) pops first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Priority queue of pending push deliveries.
pub struct EventQueue {
    mode: DispatchMode,
    heap: Mutex<BinaryHeap<QueuedEvent>>,
    next_seq: AtomicU64,
    delivered: AtomicU64,
    drainer: Mutex<Option<ThreadId>>,
    wake_tx: Option<Sender<()>>,
    dispatcher: Mutex<Option<Worker>>,
}

impl EventQueue {
    pub fn new(mode: DispatchMode) -> Arc<Self> {
        match mode {
            DispatchMode::Inline => Arc::new(Self::with_mode(mode, None)),
            DispatchMode::Worker => {
                let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
                let queue = Arc::new(Self::with_mode(mode, Some(wake_tx)));
                let weak = Arc::downgrade(&queue);
                match Worker::spawn("trackflow-dispatch", move |stop| {
                    dispatch_loop(weak, wake_rx, stop.receiver().clone())
                }) {
                    Ok(worker) => *queue.dispatcher.lock() = Some(worker),
                    Err(e) => tracing::error!(
                        "Failed to spawn dispatcher thread, events will stay queued: {}",
                        e
                    ),
                }
                queue
            }
        }
    }

    /// Queue delivering on the sending thread.
    pub fn inline() -> Arc<Self> {
        Self::new(DispatchMode::Inline)
    }

    fn with_mode(mode: DispatchMode, wake_tx: Option<Sender<()>>) -> Self {
        Self {
            mode,
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            drainer: Mutex::new(None),
            wake_tx,
            dispatcher: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.heap.lock().len()
    }

    /// Total number of deliveries run so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Queue deliveries and, in inline mode, drain if no drain is active.
    pub fn schedule(&self, events: impl IntoIterator<Item = (u32, Delivery)>) {
        {
            let mut heap = self.heap.lock();
            for (priority, deliver) in events {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                heap.push(QueuedEvent {
                    priority,
                    seq,
                    deliver,
                });
            }
        }

        match self.mode {
            DispatchMode::Inline => self.drain(),
            DispatchMode::Worker => {
                if let Some(tx) = &self.wake_tx {
                    let _ = tx.send(());
                }
            }
        }
    }

    /// Deliver queued events until the queue is empty, unless another drain
    /// is active.
    pub fn drain(&self) {
        {
            let mut drainer = self.drainer.lock();
            if drainer.is_some() {
                return;
            }
            *drainer = Some(thread::current().id());
        }
        let _guard = DrainGuard { queue: self };

        loop {
            let next = self.heap.lock().pop();
            match next {
                Some(event) => {
                    (event.deliver)();
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    // emptiness check and release happen under the drainer
                    // lock so a concurrent schedule either sees us or drains
                    let mut drainer = self.drainer.lock();
                    if self.heap.lock().is_empty() {
                        *drainer = None;
                        return;
                    }
                }
            }
        }
    }

    /// Whether the calling thread is currently draining this queue.
    pub fn is_draining_here(&self) -> bool {
        *self.drainer.lock() == Some(thread::current().id())
    }

    /// Stop the dispatcher thread, if any. Pending events are dropped.
    pub fn shutdown(&self) {
        let worker = self.dispatcher.lock().take();
        drop(worker);
        let dropped = std::mem::take(&mut *self.heap.lock());
        if !dropped.is_empty() {
            tracing::debug!("Dropped {} undelivered events on shutdown", dropped.len());
        }
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Releases drain ownership if a handler panics.
struct DrainGuard<'a> {
    queue: &'a EventQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            *self.queue.drainer.lock() = None;
        }
    }
}

fn dispatch_loop(queue: Weak<EventQueue>, wake_rx: Receiver<()>, stop_rx: Receiver<()>) {
    tracing::debug!("Dispatcher thread started");
    loop {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => break,
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                queue.drain();
            }
        }
    }
    tracing::debug!("Dispatcher thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Delivery) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let make = move |tag: u32| -> Delivery {
            let l = l.clone();
            Box::new(move || l.lock().push(tag))
        };
        (log, make)
    }

    #[test]
    fn test_priority_then_fifo() {
        let queue = EventQueue::inline();
        let (log, make) = recorder();
        queue.schedule(vec![(2, make(20)), (1, make(10)), (2, make(21)), (1, make(11))]);
        assert_eq!(*log.lock(), vec![10, 11, 20, 21]);
        assert_eq!(queue.delivered(), 4);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_reentrant_schedule_is_deferred() {
        let queue = EventQueue::inline();
        let log = Arc::new(Mutex::new(Vec::new()));

        let q = queue.clone();
        let l = log.clone();
        let outer: Delivery = Box::new(move || {
            let l2 = l.clone();
            q.schedule(vec![(0, Box::new(move || l2.lock().push("inner")) as Delivery)]);
            assert!(q.is_draining_here());
            l.lock().push("outer");
        });
        queue.schedule(vec![(0, outer)]);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_worker_mode_delivers_asynchronously() {
        let queue = EventQueue::new(DispatchMode::Worker);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = count.clone();
            queue.schedule(vec![(0, Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Delivery)]);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 10 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(count.load(Ordering::SeqCst), 10);
        queue.shutdown();
    }

    #[test]
    fn test_concurrent_producers_all_delivered() {
        let queue = EventQueue::inline();
        let count = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = queue.clone();
                let c = count.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let c = c.clone();
                        q.schedule(vec![(0, Box::new(move || {
                            c.fetch_add(1, Ordering::SeqCst);
                        }) as Delivery)]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        queue.drain();
        assert_eq!(count.load(Ordering::SeqCst), 1000);
    }
}
