use log::debug;
use parking_lot::Mutex;

use crate::timebase::TimeBase;
use crate::types::{Metric, Sample, SampleValue};

/// Whether the store currently takes appends. Moves strictly forward:
/// `Closed` -> `Open` -> `Sealed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intake {
    Closed,
    Open,
    Sealed,
}

struct Inner {
    intake: Intake,
    series: [Vec<Sample>; 5],
}

/// A thread-safe, append-only store of one sample series per metric.
pub struct MetricStore {
    inner: Mutex<Inner>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                intake: Intake::Closed,
                series: Default::default(),
            }),
        }
    }

    /// Starts accepting appends. Has no effect once sealed.
    pub fn open(&self) {
        let mut inner = self.inner.lock();
        if inner.intake == Intake::Closed {
            inner.intake = Intake::Open;
        }
    }

    /// Stops accepting appends for good.
    pub fn seal(&self) {
        self.inner.lock().intake = Intake::Sealed;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().intake == Intake::Open
    }

    /// Appends `value` to the series of `metric`, stamped with the time
    /// elapsed since the profile start. The timestamp is taken under the
    /// lock, which keeps each series ordered when producers race.
    ///
    /// Returns false when the sample was dropped: the store was not open or
    /// the value does not match the metric's unit.
    pub fn append(&self, metric: Metric, value: SampleValue, time_base: &TimeBase) -> bool {
        if value.unit() != metric.unit() {
            debug!("dropping {:?} for {}: unit mismatch", value, metric);
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.intake != Intake::Open {
            debug!("dropping {:?} for {}: store not open", value, metric);
            return false;
        }
        let elapsed_ns = time_base.elapsed_now();
        inner.series[metric.index()].push(Sample { elapsed_ns, value });
        true
    }

    /// Appends a reading that was taken earlier, at `elapsed_ns`. A timestamp
    /// older than the series' last sample is raised to it so the series stays
    /// non-decreasing.
    pub fn append_at(&self, metric: Metric, value: SampleValue, elapsed_ns: u64) -> bool {
        if value.unit() != metric.unit() {
            debug!("dropping {:?} for {}: unit mismatch", value, metric);
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.intake != Intake::Open {
            debug!("dropping {:?} for {}: store not open", value, metric);
            return false;
        }
        let series = &mut inner.series[metric.index()];
        let elapsed_ns = series.last().map_or(elapsed_ns, |last| elapsed_ns.max(last.elapsed_ns));
        series.push(Sample { elapsed_ns, value });
        true
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.inner.lock().series[metric.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().series.iter().all(Vec::is_empty)
    }

    /// Copies every series out, in declaration order, so callers can format
    /// without holding the lock.
    pub fn snapshot(&self) -> Vec<(Metric, Vec<Sample>)> {
        let inner = self.inner.lock();
        Metric::ALL
            .iter()
            .map(|&metric| (metric, inner.series[metric.index()].clone()))
            .collect()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}
