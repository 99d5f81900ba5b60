use crate::backends::capture::{CaptureBackend, PacketReader, PnetCapture};
use crate::backends::process::socket_mapper::{SocketMapperBackend, select_socket_mapper};
use crate::config::{CaptureMode, Config};
use crate::flow::{FlowCounters, FlowRates, FlowWindow, NEUTRAL_WINDOW, rate_divisor};
use crate::ports::{PortOwnership, resolve_port_ownership};
use crate::process::Pid;
use crate::traffic_classifier::{classify, summarize_frame};
use anyhow::Result;
use std::thread;
use std::time::{Duration, Instant};

/// Window and deadline settings for one measurement
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub window: Duration,
    pub deadline: Duration,
    pub mode: CaptureMode,
    /// Explicit interface list, replacing discovery
    pub interfaces: Option<Vec<String>>,
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            window: config.capture.window(),
            deadline: config.capture.deadline(),
            mode: config.capture.mode,
            interfaces: config.interfaces.clone(),
        }
    }
}

/// Result of capturing on a set of interfaces
#[derive(Debug, Default)]
struct CaptureOutcome {
    windows: Vec<FlowWindow>,
    /// An interface failed to open and later interfaces were not attempted
    aborted: bool,
}

/// Attributes live traffic to candidate processes
pub struct FlowMonitor {
    socket_mapper: Box<dyn SocketMapperBackend>,
    capture: Box<dyn CaptureBackend>,
    settings: MonitorSettings,
}

impl FlowMonitor {
    pub fn new(
        socket_mapper: Box<dyn SocketMapperBackend>,
        capture: Box<dyn CaptureBackend>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            socket_mapper,
            capture,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let socket_mapper =
            select_socket_mapper(config.socket_mapper.as_deref(), &config.proc_root)?;
        log::debug!("Using socket mapper backend: {}", socket_mapper.name());

        let capture = PnetCapture::new(&config.capture, config.interface_prefixes.clone());

        Ok(Self::new(
            socket_mapper,
            Box::new(capture),
            MonitorSettings::from(config),
        ))
    }

    pub fn socket_mapper_name(&self) -> &'static str {
        self.socket_mapper.name()
    }

    pub fn capture_backend_name(&self) -> &'static str {
        self.capture.name()
    }

    /// Measure per-process throughput of `pids` over one capture window.
    ///
    /// Never fails: every map in the result has exactly one entry per
    /// candidate, zero when nothing could be attributed.
    pub fn measure(&self, pids: &[Pid]) -> FlowRates {
        let mut counters = FlowCounters::new(pids);

        let ports = resolve_port_ownership(self.socket_mapper.as_ref(), pids);
        if ports.is_empty() {
            log::debug!("No candidate owns a port; skipping capture");
            return counters.rates(NEUTRAL_WINDOW);
        }

        let interfaces = match &self.settings.interfaces {
            Some(list) => list.clone(),
            None => self.capture.interfaces(),
        };

        let outcome = match self.settings.mode {
            CaptureMode::Sequential => self.capture_sequential(&interfaces, &ports, &mut counters),
            CaptureMode::Concurrent => {
                self.capture_concurrent(&interfaces, pids, &ports, &mut counters)
            }
        };

        let divisor = rate_divisor(&outcome.windows, outcome.aborted);
        log::debug!(
            "Attributed {} packets on {} interfaces over {:?}",
            counters.total_packets(),
            outcome.windows.len(),
            divisor
        );
        counters.rates(divisor)
    }

    /// Capture each interface in turn; a handle is released before the next opens
    fn capture_sequential(
        &self,
        interfaces: &[String],
        ports: &PortOwnership,
        counters: &mut FlowCounters,
    ) -> CaptureOutcome {
        let mut outcome = CaptureOutcome::default();

        for name in interfaces {
            let mut reader = match self.capture.open(name) {
                Ok(reader) => reader,
                Err(e) => {
                    log::error!("Capture aborted, cannot open {}: {:#}", name, e);
                    outcome.aborted = true;
                    break;
                }
            };

            let deadline = Instant::now() + self.settings.deadline;
            let window = capture_interface(
                name,
                reader.as_mut(),
                ports,
                counters,
                self.settings.window,
                deadline,
            );
            drop(reader);

            outcome.windows.push(window);
        }

        outcome
    }

    /// Open every handle in order, then capture all of them at once under
    /// one shared deadline, each into its own counter shard
    fn capture_concurrent(
        &self,
        interfaces: &[String],
        pids: &[Pid],
        ports: &PortOwnership,
        counters: &mut FlowCounters,
    ) -> CaptureOutcome {
        let mut outcome = CaptureOutcome::default();

        let mut readers: Vec<(&str, Box<dyn PacketReader>)> = Vec::new();
        for name in interfaces {
            match self.capture.open(name) {
                Ok(reader) => readers.push((name.as_str(), reader)),
                Err(e) => {
                    log::error!("Capture aborted, cannot open {}: {:#}", name, e);
                    outcome.aborted = true;
                    break;
                }
            }
        }

        let window_limit = self.settings.window;
        let deadline = Instant::now() + self.settings.deadline;

        let shards: Vec<(FlowCounters, FlowWindow)> = thread::scope(|scope| {
            let handles: Vec<_> = readers
                .into_iter()
                .map(|(name, mut reader)| {
                    scope.spawn(move || {
                        let mut shard = FlowCounters::new(pids);
                        let window = capture_interface(
                            name,
                            reader.as_mut(),
                            ports,
                            &mut shard,
                            window_limit,
                            deadline,
                        );
                        (shard, window)
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(shard) => Some(shard),
                    Err(_) => {
                        log::error!("Capture thread panicked; its counts are lost");
                        None
                    }
                })
                .collect()
        });

        for (shard, window) in shards {
            counters.merge(&shard);
            outcome.windows.push(window);
        }

        outcome
    }
}

/// Read frames from one handle into `counters` until the window spans
/// `window_limit`, the deadline passes, or the handle fails
fn capture_interface(
    name: &str,
    reader: &mut dyn PacketReader,
    ports: &PortOwnership,
    counters: &mut FlowCounters,
    window_limit: Duration,
    deadline: Instant,
) -> FlowWindow {
    let mut window = FlowWindow::default();
    let mut seen = 0u64;
    let mut matched = 0u64;

    log::info!("Capturing on {}", name);

    while Instant::now() < deadline {
        match reader.next_frame() {
            Ok(Some(frame)) => {
                seen += 1;
                window.observe(frame.timestamp);

                let summary = summarize_frame(frame.data);
                if let Some((pid, direction)) = classify(&summary, ports) {
                    if counters.record(pid, direction, summary.length as u64) {
                        matched += 1;
                    }
                }

                if window.elapsed() >= window_limit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Packet receive error on {}: {}", name, e);
                break;
            }
        }
    }

    if window.is_open() {
        log::info!(
            "Captured {} packets on {} ({} attributed) over {:?}",
            seen,
            name,
            matched,
            window.elapsed()
        );
    } else {
        log::info!("No packets on {} before the deadline", name);
    }
    window
}
