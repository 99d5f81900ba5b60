// Candidate process selection
//
// Candidates are read from structured process data (PID, command name, CPU
// usage) rather than from formatted command output.

use crate::process::Pid;
use sysinfo::System;

// Socket mapper backend system
pub mod socket_mapper;

/// Process entry with PID and name
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub name: String,
    /// CPU usage in percent of one core at selection time
    pub cpu_usage: f32,
}

/// Snapshot the process table and return the `limit` busiest processes
pub fn top_processes_by_cpu(limit: usize) -> Vec<ProcessEntry> {
    let mut sys = System::new_all();
    // CPU usage is a delta between two refreshes
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_all();

    let entries = sys
        .processes()
        .iter()
        .map(|(pid, proc)| ProcessEntry {
            pid: pid.as_u32() as Pid,
            name: proc.name().to_string_lossy().into_owned(),
            cpu_usage: proc.cpu_usage(),
        })
        .collect();

    rank_by_cpu(entries, limit)
}

/// Look up command names for an explicit PID list.
///
/// PIDs that are not running keep a `PID <n>` placeholder name so the caller
/// still gets one entry per requested PID.
pub fn describe_processes(pids: &[Pid]) -> Vec<ProcessEntry> {
    let sys = System::new_all();

    pids.iter()
        .map(|&pid| {
            let proc = sys.process(sysinfo::Pid::from_u32(pid as u32));
            ProcessEntry {
                pid,
                name: proc
                    .map(|p| p.name().to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("PID {}", pid)),
                cpu_usage: proc.map(|p| p.cpu_usage()).unwrap_or(0.0),
            }
        })
        .collect()
}

/// Sort by CPU usage (highest first, ties by lowest PID) and keep `limit`
pub fn rank_by_cpu(mut entries: Vec<ProcessEntry>, limit: usize) -> Vec<ProcessEntry> {
    entries.sort_by(|a, b| {
        b.cpu_usage
            .total_cmp(&a.cpu_usage)
            .then(a.pid.cmp(&b.pid))
    });
    entries.truncate(limit);
    entries
}
