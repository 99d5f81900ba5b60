use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::signal;

use pidflow::backends::process::socket_mapper::detect_socket_mappers;
use pidflow::backends::process::{ProcessEntry, describe_processes, top_processes_by_cpu};
use pidflow::config::{CaptureMode, Config};
use pidflow::process::FlowReport;
use pidflow::{FlowMonitor, Pid};

/// pidflow - per-process network throughput from live packet capture
#[derive(Parser, Debug)]
#[command(name = "pidflow")]
#[command(version)]
#[command(about = "Attribute live network traffic to processes", long_about = None)]
struct Args {
    /// PIDs to measure (comma separated or repeated)
    #[arg(long, value_name = "PID", value_delimiter = ',')]
    pid: Vec<Pid>,

    /// Measure the N busiest processes by CPU when no --pid is given
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Config file (default: <config dir>/pidflow/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Proc filesystem root, e.g. /host/proc inside a container
    #[arg(long, value_name = "PATH")]
    proc_root: Option<PathBuf>,

    /// Socket mapper backend to use
    #[arg(long, value_name = "BACKEND")]
    socket_mapper: Option<String>,

    /// Interface to capture on instead of discovered ones (repeatable)
    #[arg(long = "interface", value_name = "NAME")]
    interfaces: Vec<String>,

    /// Capture interfaces one after another instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Capture window per interface in milliseconds
    #[arg(long, value_name = "MS")]
    window_ms: Option<u64>,

    /// Repeat every SECONDS until Ctrl+C (default: measure once).
    /// Ctrl+C abandons a sample that is still capturing
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// List all available backends and exit
    #[arg(long)]
    list_backends: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded config
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.proc_root {
            config.proc_root = root.clone();
        }
        if let Some(mapper) = &self.socket_mapper {
            config.socket_mapper = Some(mapper.clone());
        }
        if !self.interfaces.is_empty() {
            config.interfaces = Some(self.interfaces.clone());
        }
        if self.sequential {
            config.capture.mode = CaptureMode::Sequential;
        }
        if let Some(window_ms) = self.window_ms {
            config.capture.window_ms = window_ms;
        }
        if let Some(top) = self.top {
            config.top = top;
        }
    }
}

fn print_available_backends(config: &Config) {
    println!("pidflow - Available Backends\n");

    println!("Socket Mappers (proc root: {}):", config.proc_root.display());
    for backend in detect_socket_mappers(&config.proc_root) {
        let status = if backend.available {
            "available"
        } else {
            "unavailable"
        };
        println!(
            "  {:20} [priority: {:?}] {}",
            backend.name, backend.priority, status
        );
    }

    println!();
    println!("Capture:");
    println!("  {:20} available", "pnet");
}

/// Pick candidates and measure them once
fn sample(monitor: &FlowMonitor, pids: &[Pid], top: usize) -> FlowReport {
    let candidates: Vec<ProcessEntry> = if pids.is_empty() {
        top_processes_by_cpu(top)
    } else {
        describe_processes(pids)
    };
    let candidate_pids: Vec<Pid> = candidates.iter().map(|c| c.pid).collect();
    log::debug!("Measuring candidates: {:?}", candidate_pids);

    let rates = monitor.measure(&candidate_pids);
    FlowReport::new(&candidates, &rates)
}

fn print_report(report: &FlowReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.to_table());
    }
    Ok(())
}

async fn run(args: &Args, config: Config) -> Result<()> {
    let top = config.top;
    let monitor = Arc::new(FlowMonitor::from_config(&config)?);
    log::info!(
        "Using socket mapper {} and capture backend {}",
        monitor.socket_mapper_name(),
        monitor.capture_backend_name()
    );

    loop {
        let monitor = Arc::clone(&monitor);
        let pids = args.pid.clone();
        let measurement = tokio::task::spawn_blocking(move || sample(&monitor, &pids, top));

        let report = tokio::select! {
            report = measurement => report.context("Measurement task failed")?,
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, stopping");
                return Ok(());
            }
        };
        print_report(&report, args.json)?;

        let Some(secs) = args.interval else {
            return Ok(());
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, stopping");
                return Ok(());
            }
        }
    }
}

/// How long shutdown waits for a measurement abandoned by Ctrl+C
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Drive `future` to completion, then shut the runtime down without waiting
/// longer than `grace` for blocking work still in flight
fn block_on_with_grace<F, T>(future: F, grace: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    result
}

fn main() -> Result<()> {
    let args = Args::parse();

    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    if args.list_backends {
        print_available_backends(&config);
        return Ok(());
    }

    // SAFETY: geteuid has no preconditions and cannot fail
    if unsafe { libc::geteuid() } != 0 {
        log::warn!("Not running as root; packet capture will likely fail");
    }

    block_on_with_grace(run(&args, config), SHUTDOWN_GRACE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_shutdown_does_not_wait_for_abandoned_measurement() {
        let started = Instant::now();

        let result = block_on_with_grace(
            async {
                // Stands in for a capture still running when Ctrl+C arrives
                drop(tokio::task::spawn_blocking(|| {
                    std::thread::sleep(Duration::from_secs(10))
                }));
                Ok(7)
            },
            Duration::from_millis(50),
        );

        assert_eq!(result.unwrap(), 7);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "pidflow",
            "--pid",
            "10,20",
            "--interface",
            "eth0",
            "--sequential",
            "--window-ms",
            "250",
            "--proc-root",
            "/host/proc",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(args.pid, vec![10, 20]);
        assert_eq!(config.interfaces, Some(vec!["eth0".to_string()]));
        assert_eq!(config.capture.mode, CaptureMode::Sequential);
        assert_eq!(config.capture.window_ms, 250);
        assert_eq!(config.proc_root, PathBuf::from("/host/proc"));
        assert_eq!(config.top, 5);
    }
}
