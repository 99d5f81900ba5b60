// Socket mapper reading raw proc text under a configurable root

use super::{ConnectionEntry, Protocol, SocketMapperBackend};
use crate::backends::BackendPriority;
use crate::process::Pid;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection tables in scan order
const CONNECTION_TABLES: [(&str, Protocol); 4] = [
    ("net/tcp", Protocol::Tcp),
    ("net/tcp6", Protocol::Tcp),
    ("net/udp", Protocol::Udp),
    ("net/udp6", Protocol::Udp),
];

/// Column holding `hex_ip:hex_port` of the local end
const LOCAL_ADDRESS_COLUMN: usize = 1;
/// Column holding the socket inode
const INODE_COLUMN: usize = 9;

/// Socket mapper parsing `<root>/<pid>/fd` links and `<root>/net/*` tables
///
/// Works against any proc root, e.g. a host /proc bind-mounted into a
/// container at /host/proc.
pub struct ProcTextSocketMapper {
    root: PathBuf,
}

impl ProcTextSocketMapper {
    pub fn new(root: &Path) -> Result<Self> {
        if !Self::is_available(root) {
            anyhow::bail!("{} has no net/tcp table", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn is_available(root: &Path) -> bool {
        root.join("net/tcp").exists()
    }
}

impl SocketMapperBackend for ProcTextSocketMapper {
    fn name(&self) -> &'static str {
        "proc-text"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn socket_inodes(&self, pid: Pid) -> Result<Vec<u64>> {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        let entries = fs::read_dir(&fd_dir)
            .with_context(|| format!("Failed to read {}", fd_dir.display()))?;

        let mut inodes = Vec::new();
        for entry in entries.flatten() {
            // Descriptors can close between listing and readlink
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                    inodes.push(inode);
                }
            }
        }
        Ok(inodes)
    }

    fn connection_entries(&self) -> Result<Vec<ConnectionEntry>> {
        let mut entries = Vec::new();
        let mut tables_read = 0;

        for (table, protocol) in CONNECTION_TABLES {
            let path = self.root.join(table);
            match fs::read_to_string(&path) {
                Ok(text) => {
                    tables_read += 1;
                    entries.extend(parse_connection_table(&text, protocol));
                }
                Err(e) => log::debug!("Skipping {}: {}", path.display(), e),
            }
        }

        if tables_read == 0 {
            anyhow::bail!("No connection table under {}", self.root.display());
        }
        Ok(entries)
    }
}

/// Extract the inode from a descriptor target of the form `socket:[<inode>]`
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Decode the hex port of an `address:port` field, e.g. `0100007F:0050` -> 80
pub fn decode_local_port(field: &str) -> Option<u16> {
    let (_, port) = field.rsplit_once(':')?;
    decode_hex_port(port)
}

/// Decode a big-endian hex port, e.g. `01BB` -> 443
pub fn decode_hex_port(hex: &str) -> Option<u16> {
    if hex.is_empty() || hex.len() > 4 {
        return None;
    }
    u16::from_str_radix(hex, 16).ok()
}

/// Parse one connection table, skipping the header and malformed rows
pub fn parse_connection_table(text: &str, protocol: Protocol) -> Vec<ConnectionEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let local_port = decode_local_port(fields.get(LOCAL_ADDRESS_COLUMN)?)?;
            let inode = fields.get(INODE_COLUMN)?.parse().ok()?;
            Some(ConnectionEntry {
                protocol,
                local_port,
                inode,
            })
        })
        .collect()
}
