use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::{CpuSource, ProfilerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Process to profile.
    #[arg(short, long)]
    pub pid: i32,

    /// Session length in milliseconds.
    #[arg(short, long, default_value = "1000")]
    pub duration: u64,

    /// Sampling interval in milliseconds, overriding the config file.
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// CPU time source: procfs or perf-task-clock.
    #[arg(long)]
    pub cpu_source: Option<String>,

    /// JSON file with a ProfilerConfig.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Record thermal and power state at session start.
    #[arg(long)]
    pub initial_state: bool,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,

    /// Print a table instead of JSON.
    #[arg(long)]
    pub summary: bool,
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn profiler_config(&self) -> Result<ProfilerConfig> {
        let mut config = match &self.config {
            Some(path) => ProfilerConfig::from_json_file(path)?,
            None => ProfilerConfig::default(),
        };
        if let Some(interval) = self.interval {
            config.sampling_interval_ms = interval;
        }
        if let Some(name) = &self.cpu_source {
            config.cpu_source = parse_cpu_source(name)?;
        }
        if self.initial_state {
            config.record_initial_state = true;
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn parse_cpu_source(name: &str) -> Result<CpuSource> {
    name.parse()
}
