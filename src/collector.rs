use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::store::MetricStore;
use crate::timebase::TimeBase;
use crate::timer::{Timer, TimerHandle};
use crate::types::{Metric, SampleValue};

/// Reads the periodic resource metrics of the profiled process.
pub trait SystemReader: Send + Sync {
    /// CPU utilization in percent, summed over all cores.
    fn cpu_usage(&self) -> Result<f64>;

    /// Resident memory in bytes.
    fn memory_footprint(&self) -> Result<u64>;
}

/// Reads one tick's worth of samples into the store. A failing reader only
/// costs the affected series its point for this tick.
fn sample_once(system: &dyn SystemReader, store: &MetricStore, time_base: &TimeBase) {
    match system.cpu_usage() {
        Ok(percent) if percent.is_finite() => {
            store.append(Metric::CpuUsage, SampleValue::Percentage(percent), time_base);
        }
        Ok(percent) => debug!("skipping non-finite cpu sample: {percent}"),
        Err(e) => debug!("skipping cpu sample: {e:#}"),
    }
    match system.memory_footprint() {
        Ok(bytes) => {
            store.append(Metric::MemoryFootprint, SampleValue::Bytes(bytes), time_base);
        }
        Err(e) => debug!("skipping memory sample: {e:#}"),
    }
}

/// Sampler drives `SystemReader` from a repeating timer and pushes the
/// readings to the metric store.
pub struct Sampler {
    system: Arc<dyn SystemReader>,
    timer: Arc<dyn Timer>,
    store: Arc<MetricStore>,
    time_base: TimeBase,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<TimerHandle>>,
}

impl Sampler {
    pub fn new(
        system: Arc<dyn SystemReader>,
        timer: Arc<dyn Timer>,
        store: Arc<MetricStore>,
        time_base: TimeBase,
        interval: Duration,
    ) -> Self {
        Self {
            system,
            timer,
            store,
            time_base,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Arms the repeating timer. If scheduling fails the timeseries stay
    /// empty for the session.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let system = self.system.clone();
        let store = self.store.clone();
        let time_base = self.time_base.clone();
        let running = self.running.clone();
        let tick = Arc::new(move || {
            if running.load(Ordering::SeqCst) {
                sample_once(system.as_ref(), &store, &time_base);
            }
        });

        match self.timer.schedule_repeating(self.interval, tick) {
            Ok(scheduled) => *handle = Some(scheduled),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                warn!("failed to schedule sampler timer: {e:#}");
            }
        }
    }

    /// Cancels the timer. Returns once no further tick can be scheduled.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            self.timer.cancel(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
