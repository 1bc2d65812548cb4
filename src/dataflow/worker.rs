//! Background threads with deterministic shutdown.
//!
//! Every thread owned by a component, module or the event queue is a
//! [`Worker`]. The thread receives a [`StopSignal`] backed by a crossbeam
//! channel: dropping the sending half wakes any pending wait immediately,
//! so `wait_timeout` serves both as the loop's sleep and as its
//! cancellation point.

use super::error::DataflowResult;
use crate::measurement::Timestamp;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receiving side of a worker's stop channel.
#[derive(Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep for `timeout`; returns `true` as soon as a stop is requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Sleep until `deadline`; returns `true` if stopped first.
    pub fn wait_until(&self, deadline: Timestamp) -> bool {
        let remaining = deadline.until();
        if remaining.is_zero() {
            self.is_stopped()
        } else {
            self.wait_timeout(remaining)
        }
    }

    /// Call `tick` every `period` until stopped. When a tick overruns its
    /// slot the schedule restarts from the current time.
    pub fn run_periodic(&self, period: Duration, mut tick: impl FnMut()) {
        let mut next = Timestamp::now() + period;
        loop {
            if self.wait_until(next) {
                return;
            }
            let now = Timestamp::now();
            next = if now < next + period {
                next + period
            } else {
                now + period
            };
            tick();
        }
    }

    /// Channel that becomes ready (disconnected) on stop, for `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// A named thread that is stopped and joined on [`Worker::stop`] or drop.
pub struct Worker {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> DataflowResult<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, rx) = crossbeam_channel::bounded::<()>(1);
        let signal = StopSignal { rx };
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(signal))?;

        tracing::debug!("Started worker thread {}", name);
        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and join it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        let Some(handle) = self.handle.take() else {
            return;
        };
        // a worker dropping its own last reference cannot join itself
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Worker thread {} panicked", self.name);
        } else {
            tracing::debug!("Stopped worker thread {}", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Optional worker owned by a component, started and stopped with it.
#[derive(Default)]
pub struct WorkerSlot {
    worker: Mutex<Option<Worker>>,
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the worker unless one is already running.
    pub fn start<F>(&self, name: impl Into<String>, body: F) -> DataflowResult<()>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(Worker::spawn(name, body)?);
        Ok(())
    }

    /// Stop and join the worker, if any.
    pub fn stop(&self) {
        // join outside the lock
        let worker = self.worker.lock().take();
        drop(worker);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(Worker::is_running)
    }
}
