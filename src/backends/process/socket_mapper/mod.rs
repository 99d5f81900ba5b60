// Socket-to-PID mapping backend system
//
// A socket mapper answers two questions:
// - which socket inodes does a process hold open (its descriptor table)
// - which local port does each socket inode sit on (the kernel connection tables)

use crate::backends::BackendPriority;
use crate::process::Pid;
use anyhow::Result;
use std::path::Path;

pub mod proc_text;
#[cfg(target_os = "linux")]
pub mod procfs;

pub use self::proc_text::ProcTextSocketMapper;
#[cfg(target_os = "linux")]
pub use self::procfs::ProcfsSocketMapper;

/// Default location of the proc filesystem
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Transport protocol of a connection table row
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// One row of a kernel connection table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub protocol: Protocol,
    pub local_port: u16,
    pub inode: u64,
}

/// Socket-to-PID mapping backend trait
pub trait SocketMapperBackend: Send + Sync {
    /// Backend name (e.g., "procfs", "proc-text")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Socket inodes held open by `pid`.
    ///
    /// Fails when the descriptor table cannot be read (process exited,
    /// permission denied).
    fn socket_inodes(&self, pid: Pid) -> Result<Vec<u64>>;

    /// Rows of the TCP, TCP6, UDP and UDP6 tables, in that order.
    ///
    /// Unreadable tables are skipped; fails only when none could be read.
    fn connection_entries(&self) -> Result<Vec<ConnectionEntry>>;
}

/// Socket mapper backend metadata for selection
#[derive(Debug, Clone)]
pub struct SocketMapperInfo {
    pub name: &'static str,
    pub priority: BackendPriority,
    pub available: bool,
}

/// Detect all socket mapper backends for the given proc root
pub fn detect_socket_mappers(proc_root: &Path) -> Vec<SocketMapperInfo> {
    let mut mappers = Vec::new();

    #[cfg(target_os = "linux")]
    mappers.push(SocketMapperInfo {
        name: "procfs",
        priority: BackendPriority::Best,
        available: ProcfsSocketMapper::is_available(proc_root),
    });

    mappers.push(SocketMapperInfo {
        name: "proc-text",
        priority: BackendPriority::Fallback,
        available: ProcTextSocketMapper::is_available(proc_root),
    });

    mappers
}

/// Select socket mapper backend
///
/// Priority order (if no preference specified):
/// 1. procfs (Best - procfs crate, only for the host's own /proc)
/// 2. proc-text (Fallback - raw table parsing, any proc root)
pub fn select_socket_mapper(
    preference: Option<&str>,
    proc_root: &Path,
) -> Result<Box<dyn SocketMapperBackend>> {
    if let Some(name) = preference {
        return create_socket_mapper(name, proc_root);
    }

    detect_socket_mappers(proc_root)
        .iter()
        .filter(|m| m.available)
        .filter_map(|info| match create_socket_mapper(info.name, proc_root) {
            Ok(mapper) => Some(mapper),
            Err(e) => {
                log::debug!("Socket mapper {} unusable: {:#}", info.name, e);
                None
            }
        })
        .max_by_key(|mapper| mapper.priority())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No socket mapper backend available for {}",
                proc_root.display()
            )
        })
}

fn create_socket_mapper(name: &str, proc_root: &Path) -> Result<Box<dyn SocketMapperBackend>> {
    match name {
        #[cfg(target_os = "linux")]
        "procfs" => Ok(Box::new(ProcfsSocketMapper::new(proc_root)?)),
        "proc-text" => Ok(Box::new(ProcTextSocketMapper::new(proc_root)?)),
        _ => Err(anyhow::anyhow!("Unknown socket mapper: {}", name)),
    }
}
