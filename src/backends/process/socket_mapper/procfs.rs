// Linux procfs-based socket mapper

use super::{ConnectionEntry, DEFAULT_PROC_ROOT, Protocol, SocketMapperBackend};
use crate::backends::BackendPriority;
use crate::process::Pid;
use anyhow::{Context, Result};
use procfs::process::{FDTarget, Process};
use std::path::Path;

/// Socket mapper using the procfs crate
///
/// This backend reads socket information from:
/// - /proc/[pid]/fd/ - for socket inodes
/// - /proc/net/tcp, /proc/net/tcp6 - for TCP connections
/// - /proc/net/udp, /proc/net/udp6 - for UDP connections
///
/// The procfs crate reads the host's own /proc, so this backend is only
/// offered for the default proc root.
pub struct ProcfsSocketMapper;

impl ProcfsSocketMapper {
    pub fn new(proc_root: &Path) -> Result<Self> {
        if !Self::is_available(proc_root) {
            anyhow::bail!(
                "procfs backend needs {} (got {})",
                DEFAULT_PROC_ROOT,
                proc_root.display()
            );
        }
        Ok(Self)
    }

    pub fn is_available(proc_root: &Path) -> bool {
        proc_root == Path::new(DEFAULT_PROC_ROOT) && Path::new("/proc/net/tcp").exists()
    }
}

impl SocketMapperBackend for ProcfsSocketMapper {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Best
    }

    fn socket_inodes(&self, pid: Pid) -> Result<Vec<u64>> {
        let process = Process::new(pid).with_context(|| format!("PID {} not found", pid))?;
        let fds = process
            .fd()
            .with_context(|| format!("Failed to list descriptors of PID {}", pid))?;

        // Descriptors can close while we iterate; skip those
        Ok(fds
            .filter_map(|fd| fd.ok())
            .filter_map(|fd| match fd.target {
                FDTarget::Socket(inode) => Some(inode),
                _ => None,
            })
            .collect())
    }

    fn connection_entries(&self) -> Result<Vec<ConnectionEntry>> {
        let mut entries = Vec::new();
        let mut tables_read = 0;

        match procfs::net::tcp() {
            Ok(rows) => {
                tables_read += 1;
                entries.extend(rows.iter().map(|row| ConnectionEntry {
                    protocol: Protocol::Tcp,
                    local_port: row.local_address.port(),
                    inode: row.inode,
                }));
            }
            Err(e) => log::debug!("Skipping tcp table: {}", e),
        }

        match procfs::net::tcp6() {
            Ok(rows) => {
                tables_read += 1;
                entries.extend(rows.iter().map(|row| ConnectionEntry {
                    protocol: Protocol::Tcp,
                    local_port: row.local_address.port(),
                    inode: row.inode,
                }));
            }
            Err(e) => log::debug!("Skipping tcp6 table: {}", e),
        }

        match procfs::net::udp() {
            Ok(rows) => {
                tables_read += 1;
                entries.extend(rows.iter().map(|row| ConnectionEntry {
                    protocol: Protocol::Udp,
                    local_port: row.local_address.port(),
                    inode: row.inode,
                }));
            }
            Err(e) => log::debug!("Skipping udp table: {}", e),
        }

        match procfs::net::udp6() {
            Ok(rows) => {
                tables_read += 1;
                entries.extend(rows.iter().map(|row| ConnectionEntry {
                    protocol: Protocol::Udp,
                    local_port: row.local_address.port(),
                    inode: row.inode,
                }));
            }
            Err(e) => log::debug!("Skipping udp6 table: {}", e),
        }

        if tables_read == 0 {
            anyhow::bail!("No connection table could be read");
        }
        Ok(entries)
    }
}
