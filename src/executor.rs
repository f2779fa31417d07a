//! Where observer callbacks run.
//!
//! Watchers fire on their polling threads. Hosts whose observer state may
//! only be touched from one thread (an editor UI thread) route callbacks
//! through a [`TaskQueue`] and drain it from that thread. The queue is FIFO,
//! so dispatches from one watcher run in the order they were detected.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs tasks immediately on the calling (polling) thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) {
        task();
    }
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bounded FIFO of tasks, drained by the thread that owns it. When full,
/// `execute` blocks the submitting watcher until there is room.
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// A handle watchers can submit to.
    pub fn executor(&self) -> QueueExecutor {
        QueueExecutor {
            tx: self.tx.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Run every task queued right now. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[derive(Clone)]
pub struct QueueExecutor {
    tx: Sender<Task>,
}

impl Executor for QueueExecutor {
    fn execute(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("Task queue is gone, dropping callback");
        }
    }
}
