//! Deterministic collaborators for driving a profiling session in tests.
//!
//! Timer ticks and notifications only happen when the test asks for them,
//! and time only moves when the test advances the [`ManualClock`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;

use crate::collector::SystemReader;
use crate::observer::{EventHandler, ProcessInfo, SubscriptionId};
use crate::timebase::Clock;
use crate::timer::{TickCallback, Timer, TimerHandle};
use crate::types::{EventSource, SystemEvent, ThermalState};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ns: u64) -> Self {
        Self { now_ns: AtomicU64::new(now_ns) }
    }

    pub fn advance(&self, ns: u64) {
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

struct Scheduled {
    id: u64,
    interval: Duration,
    callback: TickCallback,
    active: bool,
}

/// Timer whose ticks are fired by hand.
///
/// Cancelled callbacks are remembered so a test can replay a tick that raced
/// the cancellation.
#[derive(Default)]
pub struct FakeTimer {
    scheduled: Mutex<Vec<Scheduled>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_scheduling(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Runs one tick of every active schedule.
    pub fn fire(&self) {
        let callbacks: Vec<TickCallback> = self
            .scheduled
            .lock()
            .iter()
            .filter(|s| s.active)
            .map(|s| s.callback.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Runs one tick of every schedule ever made, cancelled or not.
    pub fn fire_including_cancelled(&self) {
        let callbacks: Vec<TickCallback> =
            self.scheduled.lock().iter().map(|s| s.callback.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn active_count(&self) -> usize {
        self.scheduled.lock().iter().filter(|s| s.active).count()
    }

    /// Interval of the first active schedule.
    pub fn interval(&self) -> Option<Duration> {
        self.scheduled.lock().iter().find(|s| s.active).map(|s| s.interval)
    }
}

impl Timer for FakeTimer {
    fn schedule_repeating(
        &self,
        interval: Duration,
        callback: TickCallback,
    ) -> Result<TimerHandle> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("scheduling disabled");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.scheduled.lock().push(Scheduled { id, interval, callback, active: true });
        Ok(TimerHandle(id))
    }

    fn cancel(&self, handle: TimerHandle) {
        for scheduled in self.scheduled.lock().iter_mut() {
            if scheduled.id == handle.0 {
                scheduled.active = false;
            }
        }
    }
}

/// System reader returning fixed values, each of which can be made to fail.
pub struct FakeSystemReader {
    cpu_percent: Mutex<f64>,
    memory_bytes: AtomicU64,
    fail_cpu: AtomicBool,
    fail_memory: AtomicBool,
}

impl FakeSystemReader {
    pub fn new(cpu_percent: f64, memory_bytes: u64) -> Self {
        Self {
            cpu_percent: Mutex::new(cpu_percent),
            memory_bytes: AtomicU64::new(memory_bytes),
            fail_cpu: AtomicBool::new(false),
            fail_memory: AtomicBool::new(false),
        }
    }

    pub fn set_cpu_usage(&self, percent: f64) {
        *self.cpu_percent.lock() = percent;
    }

    pub fn set_memory_footprint(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::SeqCst);
    }

    pub fn fail_cpu(&self, fail: bool) {
        self.fail_cpu.store(fail, Ordering::SeqCst);
    }

    pub fn fail_memory(&self, fail: bool) {
        self.fail_memory.store(fail, Ordering::SeqCst);
    }
}

impl SystemReader for FakeSystemReader {
    fn cpu_usage(&self) -> Result<f64> {
        if self.fail_cpu.load(Ordering::SeqCst) {
            bail!("cpu usage unavailable");
        }
        Ok(*self.cpu_percent.lock())
    }

    fn memory_footprint(&self) -> Result<u64> {
        if self.fail_memory.load(Ordering::SeqCst) {
            bail!("memory footprint unavailable");
        }
        Ok(self.memory_bytes.load(Ordering::SeqCst))
    }
}

struct Subscriber {
    id: u64,
    source: EventSource,
    handler: EventHandler,
    active: bool,
}

/// Notification sources fired by hand.
#[derive(Default)]
pub struct FakeProcessInfo {
    subscribers: Mutex<Vec<Subscriber>>,
    refused: Mutex<HashSet<EventSource>>,
    on_subscribe: Mutex<Vec<SystemEvent>>,
    thermal_state: Mutex<Option<ThermalState>>,
    low_power_mode: Mutex<Option<bool>>,
    next_id: AtomicU64,
}

impl FakeProcessInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later subscription to `source` fail.
    pub fn refuse(&self, source: EventSource) {
        self.refused.lock().insert(source);
    }

    pub fn set_thermal_state(&self, state: ThermalState) {
        *self.thermal_state.lock() = Some(state);
    }

    pub fn set_low_power_mode(&self, enabled: bool) {
        *self.low_power_mode.lock() = Some(enabled);
    }

    /// Queues `event` for delivery from inside the next `subscribe` call on
    /// its source, the way a source that reports its current value on
    /// registration behaves.
    pub fn fire_on_subscribe(&self, event: SystemEvent) {
        self.on_subscribe.lock().push(event);
    }

    /// Delivers `event` to the live subscribers of its source.
    pub fn fire(&self, event: SystemEvent) {
        self.deliver(event, false);
    }

    /// Delivers `event` to every subscriber its source ever had.
    pub fn fire_including_unsubscribed(&self, event: SystemEvent) {
        self.deliver(event, true);
    }

    fn deliver(&self, event: SystemEvent, include_inactive: bool) {
        let handlers: Vec<EventHandler> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.source == event.source() && (s.active || include_inactive))
            .map(|s| s.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().iter().filter(|s| s.active).count()
    }
}

impl ProcessInfo for FakeProcessInfo {
    fn thermal_state(&self) -> Result<ThermalState> {
        (*self.thermal_state.lock()).ok_or_else(|| anyhow!("thermal state unknown"))
    }

    fn is_low_power_mode_enabled(&self) -> Result<bool> {
        (*self.low_power_mode.lock()).ok_or_else(|| anyhow!("power state unknown"))
    }

    fn subscribe(&self, source: EventSource, handler: EventHandler) -> Result<SubscriptionId> {
        if self.refused.lock().contains(&source) {
            bail!("{source} notifications unavailable");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push(Subscriber {
            id,
            source,
            handler: handler.clone(),
            active: true,
        });

        let queued: Vec<SystemEvent> = {
            let mut on_subscribe = self.on_subscribe.lock();
            let (now, later): (Vec<_>, Vec<_>) =
                on_subscribe.drain(..).partition(|e| e.source() == source);
            *on_subscribe = later;
            now
        };
        for event in queued {
            handler(event);
        }
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        for subscriber in self.subscribers.lock().iter_mut() {
            if subscriber.id == id.0 {
                subscriber.active = false;
            }
        }
    }
}
