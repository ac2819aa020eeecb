use std::fmt;

use serde::{Deserialize, Serialize};

/// Every metric the profiler records, in serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    MemoryFootprint,
    MemoryPressure,
    PowerState,
    ThermalState,
    CpuUsage,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::MemoryFootprint,
        Metric::MemoryPressure,
        Metric::PowerState,
        Metric::ThermalState,
        Metric::CpuUsage,
    ];

    /// Key used for this metric in the serialized output.
    pub fn key(self) -> &'static str {
        match self {
            Metric::MemoryFootprint => "memory_footprint",
            Metric::MemoryPressure => "memory_pressure",
            Metric::PowerState => "power_state",
            Metric::ThermalState => "thermal_state",
            Metric::CpuUsage => "cpu_usage_format",
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            Metric::MemoryFootprint => Unit::Bytes,
            Metric::MemoryPressure => Unit::MemoryPressureEnum,
            Metric::PowerState => Unit::Boolean,
            Metric::ThermalState => Unit::ThermalStateEnum,
            Metric::CpuUsage => Unit::Percentage,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    #[serde(rename = "byte")]
    Bytes,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "memory_pressure_enum")]
    MemoryPressureEnum,
    #[serde(rename = "thermal_state_enum")]
    ThermalStateEnum,
    #[serde(rename = "percentage")]
    Percentage,
}

impl Unit {
    pub fn name(self) -> &'static str {
        match self {
            Unit::Bytes => "byte",
            Unit::Boolean => "boolean",
            Unit::MemoryPressureEnum => "memory_pressure_enum",
            Unit::ThermalStateEnum => "thermal_state_enum",
            Unit::Percentage => "percentage",
        }
    }
}

/// System memory pressure level. Codes match the kernel dispatch levels
/// reported to applications (normal = 1, warn = 2, critical = 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Normal,
    Warn,
    Critical,
}

impl MemoryPressure {
    pub fn code(self) -> u64 {
        match self {
            MemoryPressure::Normal => 1,
            MemoryPressure::Warn => 2,
            MemoryPressure::Critical => 4,
        }
    }
}

/// Device thermal severity, from no throttling (`Nominal`) to imminent
/// shutdown territory (`Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    pub fn code(self) -> u64 {
        match self {
            ThermalState::Nominal => 0,
            ThermalState::Fair => 1,
            ThermalState::Serious => 2,
            ThermalState::Critical => 3,
        }
    }
}

/// A recorded value. The variant must agree with the unit of the series it
/// is appended to, see [`SampleValue::unit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Bytes(u64),
    Percentage(f64),
    Flag(bool),
    MemoryPressure(MemoryPressure),
    ThermalState(ThermalState),
}

impl SampleValue {
    pub fn unit(&self) -> Unit {
        match self {
            SampleValue::Bytes(_) => Unit::Bytes,
            SampleValue::Percentage(_) => Unit::Percentage,
            SampleValue::Flag(_) => Unit::Boolean,
            SampleValue::MemoryPressure(_) => Unit::MemoryPressureEnum,
            SampleValue::ThermalState(_) => Unit::ThermalStateEnum,
        }
    }
}

impl Serialize for SampleValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            SampleValue::Bytes(bytes) => serializer.serialize_u64(bytes),
            SampleValue::Percentage(percent) => serializer.serialize_f64(percent),
            SampleValue::Flag(flag) => serializer.serialize_bool(flag),
            SampleValue::MemoryPressure(level) => serializer.serialize_u64(level.code()),
            SampleValue::ThermalState(state) => serializer.serialize_u64(state.code()),
        }
    }
}

/// A single timestamped measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed_ns: u64,
    pub value: SampleValue,
}

/// Lifecycle of one profiling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// Notification delivered by a [`crate::observer::ProcessInfo`] source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    MemoryPressure(MemoryPressure),
    ThermalState(ThermalState),
    PowerState { low_power_mode: bool },
}

impl SystemEvent {
    pub fn source(&self) -> EventSource {
        match self {
            SystemEvent::MemoryPressure(_) => EventSource::MemoryPressure,
            SystemEvent::ThermalState(_) => EventSource::ThermalState,
            SystemEvent::PowerState { .. } => EventSource::PowerState,
        }
    }

    /// The metric this event feeds and the value recorded for it.
    pub fn to_sample_value(self) -> (Metric, SampleValue) {
        match self {
            SystemEvent::MemoryPressure(level) => {
                (Metric::MemoryPressure, SampleValue::MemoryPressure(level))
            }
            SystemEvent::ThermalState(state) => {
                (Metric::ThermalState, SampleValue::ThermalState(state))
            }
            SystemEvent::PowerState { low_power_mode } => {
                (Metric::PowerState, SampleValue::Flag(low_power_mode))
            }
        }
    }
}

/// The independent notification sources the observer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    MemoryPressure,
    ThermalState,
    PowerState,
}

impl EventSource {
    pub const ALL: [EventSource; 3] = [
        EventSource::MemoryPressure,
        EventSource::ThermalState,
        EventSource::PowerState,
    ];
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::MemoryPressure => f.write_str("memory-pressure"),
            EventSource::ThermalState => f.write_str("thermal-state"),
            EventSource::PowerState => f.write_str("power-state"),
        }
    }
}
