use crate::backends::process::ProcessEntry;
use crate::flow::FlowRates;
use serde::Serialize;

/// Process identifier as reported by the kernel
pub type Pid = i32;

/// Network throughput of one process over a measurement window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessFlow {
    pub pid: Pid,
    pub name: String,
    pub rx_bytes_per_sec: f64,
    pub rx_packets_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub tx_packets_per_sec: f64,
}

/// One collection cycle, ready for display or serialization
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub collected_at: String,
    pub window_secs: f64,
    pub processes: Vec<ProcessFlow>,
}

impl FlowReport {
    /// Join candidate processes with their measured rates.
    ///
    /// Candidates keep their order; a candidate missing from `rates` reports zero.
    pub fn new(candidates: &[ProcessEntry], rates: &FlowRates) -> Self {
        let processes = candidates
            .iter()
            .map(|entry| {
                let pid = entry.pid;
                ProcessFlow {
                    pid,
                    name: entry.name.clone(),
                    rx_bytes_per_sec: rates.rx_bytes.get(&pid).copied().unwrap_or(0.0),
                    rx_packets_per_sec: rates.rx_packets.get(&pid).copied().unwrap_or(0.0),
                    tx_bytes_per_sec: rates.tx_bytes.get(&pid).copied().unwrap_or(0.0),
                    tx_packets_per_sec: rates.tx_packets.get(&pid).copied().unwrap_or(0.0),
                }
            })
            .collect();

        Self {
            collected_at: chrono::Local::now().to_rfc3339(),
            window_secs: rates.window.as_secs_f64(),
            processes,
        }
    }

    /// Render as a fixed-width table
    pub fn to_table(&self) -> String {
        let mut out = format!(
            "{:>8}  {:<16} {:>12} {:>10} {:>12} {:>10}\n",
            "PID", "COMMAND", "RX", "RX pkt/s", "TX", "TX pkt/s"
        );
        for p in &self.processes {
            out.push_str(&format!(
                "{:>8}  {:<16} {:>12} {:>10.1} {:>12} {:>10.1}\n",
                p.pid,
                truncate(&p.name, 16),
                format_rate(p.rx_bytes_per_sec),
                p.rx_packets_per_sec,
                format_rate(p.tx_bytes_per_sec),
                p.tx_packets_per_sec,
            ));
        }
        out.push_str(&format!("window: {:.3}s\n", self.window_secs));
        out
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec < 1024.0 {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else if bytes_per_sec < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB/s", bytes_per_sec / (1024.0 * 1024.0 * 1024.0))
    }
}

fn truncate(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowCounters;
    use crate::flow::Direction;
    use std::time::Duration;

    fn entry(pid: Pid, name: &str) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: name.to_string(),
            cpu_usage: 0.0,
        }
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(512.0), "512 B/s");
        assert_eq!(format_rate(1536.0), "1.5 KB/s");
        assert_eq!(format_rate(3.0 * 1024.0 * 1024.0), "3.0 MB/s");
        assert_eq!(format_rate(2.0 * 1024.0 * 1024.0 * 1024.0), "2.0 GB/s");
    }

    #[test]
    fn test_report_keeps_candidate_order_and_zero_fills() {
        let mut counters = FlowCounters::new(&[10, 20]);
        counters.record(20, Direction::Transmit, 1000);
        let rates = counters.rates(Duration::from_secs(2));

        let candidates = vec![entry(20, "nginx"), entry(10, "sshd"), entry(30, "late")];
        let report = FlowReport::new(&candidates, &rates);

        let pids: Vec<Pid> = report.processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![20, 10, 30]);
        assert_eq!(report.processes[0].tx_bytes_per_sec, 500.0);
        assert_eq!(report.processes[0].tx_packets_per_sec, 0.5);
        assert_eq!(report.processes[1].rx_bytes_per_sec, 0.0);
        assert_eq!(report.processes[2].tx_bytes_per_sec, 0.0);
        assert_eq!(report.window_secs, 2.0);
    }

    #[test]
    fn test_report_table_and_json() {
        let counters = FlowCounters::new(&[1]);
        let rates = counters.rates(Duration::from_secs(1));
        let report = FlowReport::new(&[entry(1, "a-very-long-command-name")], &rates);

        let table = report.to_table();
        assert!(table.contains("a-very-long-comm "));
        assert!(table.contains("window: 1.000s"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["processes"][0]["pid"], 1);
        assert_eq!(json["window_secs"], 1.0);
    }
}
