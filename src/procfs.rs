//! Linux implementations of the profiler's collaborators, read from
//! `/proc` and `/sys`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use log::debug;
use parking_lot::Mutex;

use crate::collector::SystemReader;
use crate::config::CpuSource;
use crate::observer::{EventHandler, ProcessInfo, SubscriptionId};
use crate::perf::TaskClock;
use crate::timer::{Timer, TimerHandle};
use crate::types::{EventSource, MemoryPressure, SystemEvent, ThermalState};

const PSI_MEMORY: &str = "/proc/pressure/memory";
const THERMAL_ROOT: &str = "/sys/class/thermal";
const PLATFORM_PROFILE: &str = "/sys/firmware/acpi/platform_profile";

/// `some avg10` thresholds, in percent of stalled time.
const PRESSURE_WARN_AVG10: f64 = 10.0;
const PRESSURE_CRITICAL_AVG10: f64 = 40.0;

/// Zone temperature thresholds in millidegrees Celsius.
const THERMAL_FAIR_MC: i64 = 70_000;
const THERMAL_SERIOUS_MC: i64 = 80_000;
const THERMAL_CRITICAL_MC: i64 = 90_000;

/// Resident set size in pages, the second field of `/proc/<pid>/statm`.
pub fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// utime + stime in clock ticks from `/proc/<pid>/stat`.
pub fn parse_stat_cpu_ticks(stat: &str) -> Option<u64> {
    // Format: pid (comm) state ppid ... utime stime ...
    // comm may contain spaces and parens, so split after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is state (field 3); utime and stime are fields 14 and 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Maps PSI output (`some avg10=1.23 avg60=... total=...`) to a level.
pub fn parse_memory_pressure(psi: &str) -> Option<MemoryPressure> {
    let line = psi.lines().find(|line| line.starts_with("some "))?;
    let avg10: f64 = line
        .split_whitespace()
        .find_map(|field| field.strip_prefix("avg10="))?
        .parse()
        .ok()?;
    Some(if avg10 >= PRESSURE_CRITICAL_AVG10 {
        MemoryPressure::Critical
    } else if avg10 >= PRESSURE_WARN_AVG10 {
        MemoryPressure::Warn
    } else {
        MemoryPressure::Normal
    })
}

pub fn thermal_state_for(millidegrees: i64) -> ThermalState {
    if millidegrees >= THERMAL_CRITICAL_MC {
        ThermalState::Critical
    } else if millidegrees >= THERMAL_SERIOUS_MC {
        ThermalState::Serious
    } else if millidegrees >= THERMAL_FAIR_MC {
        ThermalState::Fair
    } else {
        ThermalState::Nominal
    }
}

pub fn parse_platform_profile(profile: &str) -> bool {
    profile.trim() == "low-power"
}

fn read_memory_pressure() -> Result<MemoryPressure> {
    let text = fs::read_to_string(PSI_MEMORY)
        .with_context(|| format!("Failed to read {}", PSI_MEMORY))?;
    parse_memory_pressure(&text).ok_or_else(|| anyhow!("Malformed {}", PSI_MEMORY))
}

/// State of the hottest thermal zone.
fn read_thermal_state(root: &Path) -> Result<ThermalState> {
    let entries = fs::read_dir(root).with_context(|| format!("Failed to list {:?}", root))?;
    let hottest = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("thermal_zone"))
        .filter_map(|entry| fs::read_to_string(entry.path().join("temp")).ok())
        .filter_map(|temp| temp.trim().parse::<i64>().ok())
        .max()
        .ok_or_else(|| anyhow!("No readable thermal zone under {:?}", root))?;
    Ok(thermal_state_for(hottest))
}

fn read_low_power_mode() -> Result<bool> {
    let text = fs::read_to_string(PLATFORM_PROFILE)
        .with_context(|| format!("Failed to read {}", PLATFORM_PROFILE))?;
    Ok(parse_platform_profile(&text))
}

fn read_source(source: EventSource, thermal_root: &Path) -> Result<SystemEvent> {
    Ok(match source {
        EventSource::MemoryPressure => SystemEvent::MemoryPressure(read_memory_pressure()?),
        EventSource::ThermalState => SystemEvent::ThermalState(read_thermal_state(thermal_root)?),
        EventSource::PowerState => SystemEvent::PowerState {
            low_power_mode: read_low_power_mode()?,
        },
    })
}

fn sysconf(name: libc::c_int) -> Result<u64> {
    let value = unsafe { libc::sysconf(name) };
    if value <= 0 {
        return Err(anyhow!("sysconf({}) unavailable", name));
    }
    Ok(value as u64)
}

enum CpuTime {
    Procfs { stat_path: PathBuf, ticks_per_sec: u64 },
    TaskClock(TaskClock),
}

impl CpuTime {
    fn read_ns(&mut self) -> Result<u64> {
        match self {
            CpuTime::Procfs { stat_path, ticks_per_sec } => {
                let stat = fs::read_to_string(&*stat_path)
                    .with_context(|| format!("Failed to read {:?}", stat_path))?;
                let ticks = parse_stat_cpu_ticks(&stat)
                    .ok_or_else(|| anyhow!("Malformed {:?}", stat_path))?;
                Ok(ticks.saturating_mul(1_000_000_000) / *ticks_per_sec)
            }
            CpuTime::TaskClock(clock) => clock.read_ns(),
        }
    }
}

struct CpuState {
    source: CpuTime,
    last: Option<(u64, Instant)>,
}

/// CPU and memory readings for one process.
pub struct ProcSystemReader {
    statm_path: PathBuf,
    page_size: u64,
    cpu: Mutex<CpuState>,
}

impl ProcSystemReader {
    pub fn new(pid: i32, cpu_source: CpuSource) -> Result<Self> {
        let proc_dir = PathBuf::from(format!("/proc/{}", pid));
        let source = match cpu_source {
            CpuSource::Procfs => CpuTime::Procfs {
                stat_path: proc_dir.join("stat"),
                ticks_per_sec: sysconf(libc::_SC_CLK_TCK)?,
            },
            CpuSource::PerfTaskClock => CpuTime::TaskClock(TaskClock::new(pid)?),
        };
        let reader = Self {
            statm_path: proc_dir.join("statm"),
            page_size: sysconf(libc::_SC_PAGESIZE)?,
            cpu: Mutex::new(CpuState { source, last: None }),
        };
        // Take the baseline now so the first tick already yields a value.
        if let Err(e) = reader.cpu_usage() {
            debug!("no cpu baseline for pid {}: {e:#}", pid);
        }
        Ok(reader)
    }
}

impl SystemReader for ProcSystemReader {
    fn cpu_usage(&self) -> Result<f64> {
        let mut cpu = self.cpu.lock();
        let cpu_ns = cpu.source.read_ns()?;
        let now = Instant::now();
        let previous = cpu.last.replace((cpu_ns, now));
        let (last_ns, last_at) = previous.ok_or_else(|| anyhow!("no cpu baseline yet"))?;
        let wall_ns = now.duration_since(last_at).as_nanos() as f64;
        if wall_ns == 0.0 {
            return Err(anyhow!("no wall time elapsed since last cpu read"));
        }
        Ok(cpu_ns.saturating_sub(last_ns) as f64 / wall_ns * 100.0)
    }

    fn memory_footprint(&self) -> Result<u64> {
        let statm = fs::read_to_string(&self.statm_path)
            .with_context(|| format!("Failed to read {:?}", self.statm_path))?;
        let pages = parse_statm_resident(&statm)
            .ok_or_else(|| anyhow!("Malformed {:?}", self.statm_path))?;
        Ok(pages * self.page_size)
    }
}

/// Device state sources, turned into change notifications by polling each
/// source on a timer and firing when the value differs from the last one.
pub struct ProcProcessInfo {
    timer: Arc<dyn Timer>,
    poll_interval: Duration,
    thermal_root: PathBuf,
}

impl ProcProcessInfo {
    pub fn new(timer: Arc<dyn Timer>, poll_interval: Duration) -> Self {
        Self {
            timer,
            poll_interval,
            thermal_root: PathBuf::from(THERMAL_ROOT),
        }
    }
}

impl ProcessInfo for ProcProcessInfo {
    fn thermal_state(&self) -> Result<ThermalState> {
        read_thermal_state(&self.thermal_root)
    }

    fn is_low_power_mode_enabled(&self) -> Result<bool> {
        read_low_power_mode()
    }

    fn subscribe(&self, source: EventSource, handler: EventHandler) -> Result<SubscriptionId> {
        // A source that cannot be read now is reported as unavailable.
        let initial = read_source(source, &self.thermal_root)
            .with_context(|| format!("{} source unavailable", source))?;
        let last = Mutex::new(initial);
        let thermal_root = self.thermal_root.clone();

        let poll = Arc::new(move || match read_source(source, &thermal_root) {
            Ok(event) => {
                let changed = {
                    let mut last = last.lock();
                    let changed = *last != event;
                    *last = event;
                    changed
                };
                if changed {
                    handler(event);
                }
            }
            Err(e) => debug!("polling {} failed: {e:#}", source),
        });

        let TimerHandle(id) = self.timer.schedule_repeating(self.poll_interval, poll)?;
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.timer.cancel(TimerHandle(id.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeTimer;

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm_resident("5120 1024 300 10 0 800 0\n"), Some(1024));
        assert_eq!(parse_statm_resident("5120"), None);
        assert_eq!(parse_statm_resident(""), None);
    }

    #[test]
    fn test_parse_stat_with_spaces_in_comm() {
        let stat = "1234 (my (odd) proc) S 1 1234 1234 0 -1 4194560 100 0 0 0 250 50 0 0 20 0 1 0";
        assert_eq!(parse_stat_cpu_ticks(stat), Some(300));
        assert_eq!(parse_stat_cpu_ticks("1234 (short) S 1"), None);
    }

    #[test]
    fn test_parse_memory_pressure() {
        let psi = concat!(
            "some avg10=12.50 avg60=3.00 avg300=1.00 total=123\n",
            "full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n",
        );
        assert_eq!(parse_memory_pressure(psi), Some(MemoryPressure::Warn));
        let psi = "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\n";
        assert_eq!(parse_memory_pressure(psi), Some(MemoryPressure::Normal));
        let psi = "some avg10=55.10 avg60=0.00 avg300=0.00 total=0\n";
        assert_eq!(parse_memory_pressure(psi), Some(MemoryPressure::Critical));
        assert_eq!(parse_memory_pressure("garbage"), None);
    }

    #[test]
    fn test_thermal_thresholds() {
        assert_eq!(thermal_state_for(45_000), ThermalState::Nominal);
        assert_eq!(thermal_state_for(70_000), ThermalState::Fair);
        assert_eq!(thermal_state_for(85_500), ThermalState::Serious);
        assert_eq!(thermal_state_for(101_000), ThermalState::Critical);
    }

    #[test]
    fn test_platform_profile() {
        assert!(parse_platform_profile("low-power\n"));
        assert!(!parse_platform_profile("balanced\n"));
    }

    #[test]
    fn test_hottest_zone_wins() {
        let root = tempfile::tempdir().unwrap();
        for (zone, temp) in [("thermal_zone0", "52000\n"), ("thermal_zone1", "83000\n")] {
            let dir = root.path().join(zone);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("temp"), temp).unwrap();
        }
        fs::create_dir(root.path().join("cooling_device0")).unwrap();
        assert_eq!(read_thermal_state(root.path()).unwrap(), ThermalState::Serious);
    }

    #[test]
    fn test_thermal_subscription_fires_on_change_only() {
        let root = tempfile::tempdir().unwrap();
        let zone = root.path().join("thermal_zone0");
        fs::create_dir(&zone).unwrap();
        fs::write(zone.join("temp"), "40000\n").unwrap();

        let timer = Arc::new(FakeTimer::new());
        let mut info = ProcProcessInfo::new(timer.clone(), Duration::from_secs(1));
        info.thermal_root = root.path().to_path_buf();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = info
            .subscribe(
                EventSource::ThermalState,
                Arc::new(move |event: SystemEvent| sink.lock().push(event)),
            )
            .unwrap();

        timer.fire();
        assert!(seen.lock().is_empty());

        fs::write(zone.join("temp"), "95000\n").unwrap();
        timer.fire();
        timer.fire();
        assert_eq!(*seen.lock(), vec![SystemEvent::ThermalState(ThermalState::Critical)]);

        info.unsubscribe(id);
        assert_eq!(timer.active_count(), 0);
    }

    #[test]
    fn test_own_process_memory() {
        let reader = ProcSystemReader::new(std::process::id() as i32, CpuSource::Procfs).unwrap();
        assert!(reader.memory_footprint().unwrap() > 0);
    }

    #[test]
    fn test_own_process_with_task_clock() {
        let pid = std::process::id() as i32;
        // Permission to open perf counters is not guaranteed.
        let Ok(reader) = ProcSystemReader::new(pid, CpuSource::PerfTaskClock) else {
            return;
        };
        std::thread::sleep(Duration::from_millis(5));
        let percent = reader.cpu_usage().unwrap();
        assert!(percent.is_finite());
        assert!(percent >= 0.0);
        assert!(reader.memory_footprint().unwrap() > 0);
    }
}
