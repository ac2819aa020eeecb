#[cfg(test)]
mod tests {
    use clap::Parser;
    use rrmetrics::cli::{parse_cpu_source, Args};
    use rrmetrics::config::CpuSource;
    use rrmetrics::store::MetricStore;
    use rrmetrics::timebase::TimeBase;
    use rrmetrics::fake::ManualClock;
    use rrmetrics::types::{Metric, SampleValue};
    use std::sync::Arc;

    #[test]
    fn test_parse_perf_task_clock() {
        let source = parse_cpu_source("perf-task-clock");
        assert_eq!(source.unwrap(), CpuSource::PerfTaskClock);
    }

    #[test]
    fn test_parse_invalid() {
        let source = parse_cpu_source("invalid-source-name");
        assert!(source.is_err());
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "rrmetrics", "--pid", "1", "--interval", "20", "--cpu-source", "perf-task-clock",
            "--initial-state",
        ]);
        let config = args.profiler_config().unwrap();
        assert_eq!(config.sampling_interval_ms, 20);
        assert_eq!(config.cpu_source, CpuSource::PerfTaskClock);
        assert!(config.record_initial_state);
        assert_eq!(args.duration, 1000);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let args = Args::parse_from(["rrmetrics", "--pid", "1", "--interval", "0"]);
        assert!(args.profiler_config().is_err());
    }

    #[test]
    fn test_store_never_drops_old_samples() {
        let clock = Arc::new(ManualClock::new(0));
        let base = TimeBase::new(0, clock.clone());
        let store = MetricStore::new();
        store.open();
        for bytes in [10, 20, 30] {
            clock.advance(1);
            store.append(Metric::MemoryFootprint, SampleValue::Bytes(bytes), &base);
        }
        let snapshot = store.snapshot();
        let (_, samples) = snapshot
            .iter()
            .find(|(metric, _)| *metric == Metric::MemoryFootprint)
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].value, SampleValue::Bytes(10));
        assert_eq!(samples[2].value, SampleValue::Bytes(30));
    }
}
