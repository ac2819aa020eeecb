//! Bounded-duration resource and event profiler.
//!
//! A [`profiler::MetricProfiler`] session samples CPU usage and memory
//! footprint on a timer, records memory pressure, thermal and power state
//! notifications as they arrive, and serializes everything into per-metric
//! timeseries keyed by time elapsed since the profile start.

pub mod cli;
pub mod collector;
pub mod config;
pub mod fake;
pub mod observer;
pub mod perf;
pub mod procfs;
pub mod profiler;
pub mod report;
pub mod store;
pub mod timebase;
pub mod timer;
pub mod types;
