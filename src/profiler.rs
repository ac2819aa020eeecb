use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::collector::{Sampler, SystemReader};
use crate::config::ProfilerConfig;
use crate::observer::{EventObserver, ProcessInfo};
use crate::report::SerializedMetrics;
use crate::store::MetricStore;
use crate::timebase::{Clock, TimeBase};
use crate::timer::Timer;
use crate::types::SessionState;

/// One bounded profiling session: a timer-driven CPU/memory sampler and the
/// device state observers, both feeding a shared metric store.
///
/// `start`, `stop` and `serialize` never fail. Collaborator problems only
/// show up as missing samples.
pub struct MetricProfiler {
    state: Mutex<SessionState>,
    store: Arc<MetricStore>,
    sampler: Sampler,
    observer: EventObserver,
    record_initial_state: bool,
}

impl MetricProfiler {
    pub fn new(
        profile_start_ns: u64,
        clock: Arc<dyn Clock>,
        process_info: Arc<dyn ProcessInfo>,
        system: Arc<dyn SystemReader>,
        timer: Arc<dyn Timer>,
        config: &ProfilerConfig,
    ) -> Self {
        let time_base = TimeBase::new(profile_start_ns, clock);
        let store = Arc::new(MetricStore::new());
        let sampler = Sampler::new(
            system,
            timer,
            store.clone(),
            time_base.clone(),
            config.sampling_interval(),
        );
        let observer = EventObserver::new(process_info, store.clone(), time_base);
        Self {
            state: Mutex::new(SessionState::Idle),
            store,
            sampler,
            observer,
            record_initial_state: config.record_initial_state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn start(&self) {
        let mut state = self.state.lock();
        match *state {
            SessionState::Idle => {}
            SessionState::Running => return,
            SessionState::Stopped => {
                warn!("metric profiler already stopped; sessions cannot be restarted");
                return;
            }
        }
        self.store.open();
        self.observer.start(self.record_initial_state);
        self.sampler.start();
        *state = SessionState::Running;
        info!("metric profiler started");
    }

    /// Ends the session. Once this returns no sample can be added, even by a
    /// tick or notification that was already in flight.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Stopped {
            return;
        }
        self.store.seal();
        self.sampler.stop();
        self.observer.stop();
        *state = SessionState::Stopped;
        info!("metric profiler stopped");
    }

    /// Snapshot of everything recorded so far. Safe to call at any time and
    /// any number of times; empty before `start`.
    pub fn serialize(&self) -> SerializedMetrics {
        SerializedMetrics::from_snapshot(self.store.snapshot())
    }
}

impl Drop for MetricProfiler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeProcessInfo, FakeSystemReader, FakeTimer, ManualClock};
    use crate::types::{EventSource, Metric, SystemEvent, ThermalState};

    fn profiler(config: &ProfilerConfig) -> (Arc<FakeTimer>, Arc<FakeProcessInfo>, MetricProfiler) {
        let timer = Arc::new(FakeTimer::new());
        let info = Arc::new(FakeProcessInfo::new());
        let profiler = MetricProfiler::new(
            0,
            Arc::new(ManualClock::new(0)),
            info.clone(),
            Arc::new(FakeSystemReader::new(1.0, 1)),
            timer.clone(),
            config,
        );
        (timer, info, profiler)
    }

    #[test]
    fn test_state_transitions() {
        let (timer, _, profiler) = profiler(&ProfilerConfig::default());
        assert_eq!(profiler.state(), SessionState::Idle);
        profiler.start();
        assert_eq!(profiler.state(), SessionState::Running);
        profiler.start();
        assert_eq!(timer.active_count(), 1);
        profiler.stop();
        assert_eq!(profiler.state(), SessionState::Stopped);
    }

    #[test]
    fn test_restart_after_stop_ignored() {
        let (timer, _, profiler) = profiler(&ProfilerConfig::default());
        profiler.start();
        profiler.stop();
        profiler.start();
        assert_eq!(profiler.state(), SessionState::Stopped);
        assert_eq!(timer.active_count(), 0);
        timer.fire_including_cancelled();
        assert!(profiler.serialize().is_empty());
    }

    #[test]
    fn test_stop_before_start() {
        let (timer, info, profiler) = profiler(&ProfilerConfig::default());
        profiler.stop();
        assert_eq!(profiler.state(), SessionState::Stopped);
        profiler.start();
        assert_eq!(timer.active_count(), 0);
        assert_eq!(info.subscriber_count(), 0);
    }

    #[test]
    fn test_serialize_before_start_is_empty() {
        let (_, _, profiler) = profiler(&ProfilerConfig::default());
        assert!(profiler.serialize().is_empty());
    }

    #[test]
    fn test_initial_state_recorded_when_configured() {
        let config = ProfilerConfig { record_initial_state: true, ..Default::default() };
        let (_, info, profiler) = profiler(&config);
        info.set_thermal_state(ThermalState::Nominal);
        info.set_low_power_mode(true);
        profiler.start();
        let metrics = profiler.serialize();
        assert_eq!(metrics.keys(), vec!["power_state", "thermal_state"]);
        info.fire(SystemEvent::ThermalState(ThermalState::Fair));
        let thermal = profiler.serialize();
        assert_eq!(thermal.get(Metric::ThermalState).unwrap().values.len(), 2);
    }

    #[test]
    fn test_initial_state_skipped_for_refused_source() {
        let config = ProfilerConfig { record_initial_state: true, ..Default::default() };
        let (_, info, profiler) = profiler(&config);
        info.refuse(EventSource::ThermalState);
        info.set_thermal_state(ThermalState::Serious);
        info.set_low_power_mode(false);
        profiler.start();
        info.fire(SystemEvent::ThermalState(ThermalState::Critical));
        assert_eq!(profiler.serialize().keys(), vec!["power_state"]);
    }
}
