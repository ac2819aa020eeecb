use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Where the Linux system reader gets the process CPU time from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CpuSource {
    /// utime + stime from `/proc/<pid>/stat`.
    #[default]
    Procfs,
    /// A perf software task-clock counter attached to the pid.
    PerfTaskClock,
}

impl FromStr for CpuSource {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "procfs" => Ok(CpuSource::Procfs),
            "perf-task-clock" => Ok(CpuSource::PerfTaskClock),
            _ => bail!("Unknown cpu source: {}", name),
        }
    }
}

impl fmt::Display for CpuSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuSource::Procfs => f.write_str("procfs"),
            CpuSource::PerfTaskClock => f.write_str("perf-task-clock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Period of the CPU and memory sampler.
    pub sampling_interval_ms: u64,
    /// Record the thermal and power state once at start, before any change
    /// notification arrives.
    pub record_initial_state: bool,
    /// How often the Linux state sources are polled for changes.
    pub event_poll_interval_ms: u64,
    pub cpu_source: CpuSource,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 100,
            record_initial_state: false,
            event_poll_interval_ms: 1000,
            cpu_source: CpuSource::default(),
        }
    }
}

impl ProfilerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.sampling_interval_ms > 0, "sampling_interval_ms must be non-zero");
        ensure!(self.event_poll_interval_ms > 0, "event_poll_interval_ms must be non-zero");
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }
}
