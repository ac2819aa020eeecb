use anyhow::{Context, Result};
use perf_event::events::Software;
use perf_event::Counter;

/// Nanoseconds of CPU time consumed by a process, counted by the kernel's
/// software task clock.
pub struct TaskClock {
    counter: Counter,
}

impl TaskClock {
    pub fn new(pid: i32) -> Result<Self> {
        let mut builder = perf_event::Builder::new()
            .kind(Software::TASK_CLOCK)
            .observe_pid(pid);
        builder.inherit(true);
        let mut counter = builder
            .build()
            .with_context(|| format!("Failed to open task clock for pid {}", pid))?;
        counter.enable().context("Failed to enable task clock")?;
        Ok(Self { counter })
    }

    pub fn read_ns(&mut self) -> Result<u64> {
        Ok(self.counter.read()?)
    }
}

impl Drop for TaskClock {
    fn drop(&mut self) {
        let _ = self.counter.disable();
    }
}
