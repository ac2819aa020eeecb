use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::debug;
use parking_lot::Mutex;

pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Repeating-timer capability.
///
/// After `cancel` returns no new tick may start for that handle. A tick that
/// is already running may still finish.
pub trait Timer: Send + Sync {
    fn schedule_repeating(&self, interval: Duration, callback: TickCallback)
        -> Result<TimerHandle>;

    fn cancel(&self, handle: TimerHandle);
}

struct Worker {
    wake: Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// Timer running every schedule on its own thread.
pub struct ThreadTimer {
    next_id: AtomicU64,
    workers: Mutex<HashMap<u64, Worker>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            workers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ThreadTimer {
    fn schedule_repeating(
        &self,
        interval: Duration,
        callback: TickCallback,
    ) -> Result<TimerHandle> {
        if interval.is_zero() {
            bail!("timer interval must be non-zero");
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (wake, wait) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(format!("rrmetrics-timer-{id}"))
            .spawn(move || loop {
                // Any message or a dropped sender means cancelled.
                match wait.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => callback(),
                    _ => break,
                }
            })
            .context("Failed to spawn timer thread")?;

        self.workers.lock().insert(id, Worker { wake, thread });
        Ok(TimerHandle(id))
    }

    fn cancel(&self, handle: TimerHandle) {
        let Some(worker) = self.workers.lock().remove(&handle.0) else {
            debug!("cancel of unknown timer {}", handle.0);
            return;
        };
        let _ = worker.wake.send(());
        drop(worker.wake);
        // Cancelling from inside the tick itself must not wait on itself.
        if worker.thread.thread().id() != thread::current().id() {
            let _ = worker.thread.join();
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        let workers: Vec<u64> = self.workers.lock().keys().copied().collect();
        for id in workers {
            self.cancel(TimerHandle(id));
        }
    }
}
