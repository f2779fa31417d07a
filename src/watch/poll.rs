//! A background thread that calls a [`Poller`] once per tick until stopped.
//!
//! The thread waits on a stop channel with the tick as timeout, so a stop
//! request wakes it immediately instead of after the current sleep.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::{CovwatchError, Result};

/// Work performed on every tick.
pub trait Poller: Send + 'static {
    fn poll(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NotStarted,
    Running,
    /// Stop was requested but the thread has not been seen to exit yet.
    Stopping,
    Stopped,
}

pub struct PollingThread {
    /// What is being polled; used in logs and errors.
    label: PathBuf,
    interval: Duration,
    state: ThreadState,
    stop_tx: Option<Sender<()>>,
    /// Disconnects when the thread exits.
    done_rx: Option<Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PollingThread {
    pub fn new(label: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            state: ThreadState::NotStarted,
            stop_tx: None,
            done_rx: None,
            handle: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// True while the thread is executing, including after a stop request
    /// that has not completed.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the polling loop. Starting a running thread is a no-op;
    /// a stopped thread cannot be restarted.
    pub fn start<P: Poller>(&mut self, mut poller: P) -> Result<()> {
        match self.state {
            ThreadState::Running | ThreadState::Stopping => return Ok(()),
            ThreadState::Stopped => return Err(CovwatchError::WatcherStopped),
            ThreadState::NotStarted => {}
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(0);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("covwatch-poll".to_string())
            .spawn(move || {
                let _done = done_tx;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => poller.poll(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        debug!("[poll] started for {} every {:?}", self.label.display(), interval);
        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);
        self.handle = Some(handle);
        self.state = ThreadState::Running;
        Ok(())
    }

    /// Ask the thread to exit and wait up to `timeout` for it to do so.
    ///
    /// Safe to call repeatedly. On timeout the thread stays signalled and the
    /// state is `Stopping`; a later call waits again.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        match self.state {
            ThreadState::NotStarted => {
                self.state = ThreadState::Stopped;
                return Ok(());
            }
            ThreadState::Stopped => return Ok(()),
            ThreadState::Running | ThreadState::Stopping => {}
        }

        if let Some(tx) = &self.stop_tx {
            // A full slot means a stop is already pending.
            let _ = tx.try_send(());
        }
        self.state = ThreadState::Stopping;

        if let Some(rx) = &self.done_rx {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                return Err(CovwatchError::StopTimeout {
                    path: self.label.clone(),
                    timeout,
                });
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[poll] thread for {} panicked", self.label.display());
            }
        }
        self.stop_tx = None;
        self.done_rx = None;
        self.state = ThreadState::Stopped;
        debug!("[poll] stopped for {}", self.label.display());
        Ok(())
    }
}

impl Drop for PollingThread {
    fn drop(&mut self) {
        // Disconnecting the stop channel ends the loop; do not block here.
        self.stop_tx.take();
    }
}
