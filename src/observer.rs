//! Event-driven metrics: memory pressure, thermal state and power state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::store::MetricStore;
use crate::timebase::TimeBase;
use crate::types::{EventSource, SystemEvent, ThermalState};

pub type EventHandler = Arc<dyn Fn(SystemEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Process and device state, plus change notifications for it.
///
/// Each source may deliver on its own thread. After `unsubscribe` returns the
/// handler must not be invoked again for a new event.
pub trait ProcessInfo: Send + Sync {
    fn thermal_state(&self) -> Result<ThermalState>;

    fn is_low_power_mode_enabled(&self) -> Result<bool>;

    /// Registers `handler` to receive one event per state change of `source`.
    fn subscribe(&self, source: EventSource, handler: EventHandler) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Per-source hold on live events until the subscription is confirmed and
/// the initial reading, if any, is in the store.
#[derive(Default)]
struct SourceGate {
    ready: bool,
    pending: Vec<(SystemEvent, u64)>,
}

/// Records one sample per notification from each [`EventSource`].
pub struct EventObserver {
    process_info: Arc<dyn ProcessInfo>,
    store: Arc<MetricStore>,
    time_base: TimeBase,
    listening: Arc<AtomicBool>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl EventObserver {
    pub fn new(
        process_info: Arc<dyn ProcessInfo>,
        store: Arc<MetricStore>,
        time_base: TimeBase,
    ) -> Self {
        Self {
            process_info,
            store,
            time_base,
            listening: Arc::new(AtomicBool::new(false)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn handler_for(&self, source: EventSource, gate: Arc<Mutex<SourceGate>>) -> EventHandler {
        let store = self.store.clone();
        let time_base = self.time_base.clone();
        let listening = self.listening.clone();
        Arc::new(move |event: SystemEvent| {
            if !listening.load(Ordering::SeqCst) {
                return;
            }
            if event.source() != source {
                debug!("ignoring {:?} delivered on {} source", event, source);
                return;
            }
            let mut gate = gate.lock();
            if gate.ready {
                let (metric, value) = event.to_sample_value();
                store.append(metric, value, &time_base);
            } else {
                gate.pending.push((event, time_base.elapsed_now()));
            }
        })
    }

    /// The current value of `source`, stamped with the time it was read.
    fn current_state(&self, source: EventSource) -> Option<(SystemEvent, u64)> {
        let event = match source {
            EventSource::MemoryPressure => return None,
            EventSource::ThermalState => match self.process_info.thermal_state() {
                Ok(state) => SystemEvent::ThermalState(state),
                Err(e) => {
                    debug!("no initial thermal state: {e:#}");
                    return None;
                }
            },
            EventSource::PowerState => match self.process_info.is_low_power_mode_enabled() {
                Ok(low_power_mode) => SystemEvent::PowerState { low_power_mode },
                Err(e) => {
                    debug!("no initial power state: {e:#}");
                    return None;
                }
            },
        };
        Some((event, self.time_base.elapsed_now()))
    }

    /// Records the initial reading and whatever arrived while subscribing,
    /// then lets later events through directly.
    fn release(&self, gate: &Mutex<SourceGate>, initial: Option<(SystemEvent, u64)>) {
        let mut gate = gate.lock();
        let pending = std::mem::take(&mut gate.pending);
        for (event, elapsed_ns) in initial.into_iter().chain(pending) {
            let (metric, value) = event.to_sample_value();
            self.store.append_at(metric, value, elapsed_ns);
        }
        gate.ready = true;
    }

    /// Subscribes to every source. A source that refuses the subscription
    /// leaves its series empty; the others are unaffected.
    ///
    /// With `record_initial_state` the current thermal state and low-power
    /// flag are read before subscribing and become the first sample of their
    /// series, ahead of any change delivered meanwhile.
    pub fn start(&self, record_initial_state: bool) {
        let mut subscriptions = self.subscriptions.lock();
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        for source in EventSource::ALL {
            let initial = if record_initial_state {
                self.current_state(source)
            } else {
                None
            };
            let gate = Arc::new(Mutex::new(SourceGate::default()));
            match self.process_info.subscribe(source, self.handler_for(source, gate.clone())) {
                Ok(id) => {
                    subscriptions.push(id);
                    self.release(&gate, initial);
                }
                Err(e) => warn!("failed to subscribe to {source} notifications: {e:#}"),
            }
        }
    }

    /// Unsubscribes from every source that accepted a subscription.
    pub fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        for id in self.subscriptions.lock().drain(..) {
            self.process_info.unsubscribe(id);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}
