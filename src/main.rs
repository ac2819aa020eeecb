use std::sync::Arc;
use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use rrmetrics::cli;
use rrmetrics::procfs::{ProcProcessInfo, ProcSystemReader};
use rrmetrics::profiler::MetricProfiler;
use rrmetrics::timebase::MonotonicClock;
use rrmetrics::timer::ThreadTimer;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::Args::parse();
    let config = args.profiler_config()?;

    let timer = Arc::new(ThreadTimer::new());
    let system = Arc::new(ProcSystemReader::new(args.pid, config.cpu_source)?);
    let process_info = Arc::new(ProcProcessInfo::new(timer.clone(), config.event_poll_interval()));

    let profiler = MetricProfiler::new(
        MonotonicClock::now(),
        Arc::new(MonotonicClock),
        process_info,
        system,
        timer,
        &config,
    );
    profiler.start();
    thread::sleep(Duration::from_millis(args.duration));
    profiler.stop();

    let metrics = profiler.serialize();
    if args.summary {
        print!("{}", metrics.summary());
    } else if args.pretty {
        println!("{}", metrics.to_json_pretty()?);
    } else {
        println!("{}", metrics.to_json()?);
    }
    Ok(())
}
