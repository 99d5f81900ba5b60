//! Port ownership resolution.
//!
//! Candidate PIDs are turned into a local-port -> PID map in two steps:
//! socket inodes are collected from each candidate's descriptor table, then
//! matched against the kernel connection tables.
//!
//! Ownership is approximate in two accepted ways:
//! - an inode shared by several candidates (inherited across fork) belongs to
//!   the lowest PID;
//! - TCP and UDP ports share one namespace, so a TCP and a UDP socket on the
//!   same port number alias to the row scanned last (tables are scanned in
//!   the fixed order tcp, tcp6, udp, udp6).

use crate::backends::process::socket_mapper::{ConnectionEntry, SocketMapperBackend};
use crate::process::Pid;
use std::collections::HashMap;

/// Local port number -> owning process
pub type PortOwnership = HashMap<u16, Pid>;

/// Map every socket inode held by a candidate to its owner.
///
/// Candidates whose descriptors cannot be read are skipped.
pub fn resolve_socket_owners(mapper: &dyn SocketMapperBackend, pids: &[Pid]) -> HashMap<u64, Pid> {
    let mut owners: HashMap<u64, Pid> = HashMap::new();

    for &pid in pids {
        match mapper.socket_inodes(pid) {
            Ok(inodes) => {
                log::trace!("PID {} holds {} sockets", pid, inodes.len());
                for inode in inodes {
                    owners
                        .entry(inode)
                        .and_modify(|owner| *owner = (*owner).min(pid))
                        .or_insert(pid);
                }
            }
            Err(e) => log::debug!("Skipping PID {}: {:#}", pid, e),
        }
    }

    owners
}

/// Attribute connection table rows to socket owners
pub fn map_ports(owners: &HashMap<u64, Pid>, entries: &[ConnectionEntry]) -> PortOwnership {
    let mut ports = PortOwnership::new();

    for entry in entries {
        if let Some(&pid) = owners.get(&entry.inode) {
            if let Some(previous) = ports.insert(entry.local_port, pid) {
                if previous != pid {
                    log::trace!(
                        "Port {} reassigned from PID {} to PID {} ({:?})",
                        entry.local_port,
                        previous,
                        pid,
                        entry.protocol
                    );
                }
            }
        }
    }

    ports
}

/// Resolve the local ports owned by `pids`.
///
/// Never fails: unreadable descriptor tables and connection tables degrade
/// to fewer (possibly zero) owned ports.
pub fn resolve_port_ownership(mapper: &dyn SocketMapperBackend, pids: &[Pid]) -> PortOwnership {
    let owners = resolve_socket_owners(mapper, pids);
    if owners.is_empty() {
        return PortOwnership::new();
    }

    match mapper.connection_entries() {
        Ok(entries) => {
            let ports = map_ports(&owners, &entries);
            log::debug!(
                "Resolved {} sockets to {} owned ports via {}",
                owners.len(),
                ports.len(),
                mapper.name()
            );
            ports
        }
        Err(e) => {
            log::warn!("Connection tables unavailable: {:#}", e);
            PortOwnership::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendPriority;
    use crate::backends::process::socket_mapper::Protocol;
    use anyhow::Result;

    struct FakeMapper {
        sockets: HashMap<Pid, Vec<u64>>,
        entries: Option<Vec<ConnectionEntry>>,
    }

    impl SocketMapperBackend for FakeMapper {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn priority(&self) -> BackendPriority {
            BackendPriority::Fallback
        }

        fn socket_inodes(&self, pid: Pid) -> Result<Vec<u64>> {
            self.sockets
                .get(&pid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such process"))
        }

        fn connection_entries(&self) -> Result<Vec<ConnectionEntry>> {
            self.entries
                .clone()
                .ok_or_else(|| anyhow::anyhow!("tables unreadable"))
        }
    }

    fn row(protocol: Protocol, local_port: u16, inode: u64) -> ConnectionEntry {
        ConnectionEntry {
            protocol,
            local_port,
            inode,
        }
    }

    #[test]
    fn test_unreadable_process_is_skipped() {
        let mapper = FakeMapper {
            sockets: HashMap::from([(100, vec![1, 2])]),
            entries: None,
        };
        let owners = resolve_socket_owners(&mapper, &[100, 200]);
        assert_eq!(owners, HashMap::from([(1, 100), (2, 100)]));
    }

    #[test]
    fn test_shared_inode_goes_to_lowest_pid() {
        let mapper = FakeMapper {
            sockets: HashMap::from([(300, vec![7]), (100, vec![7]), (200, vec![7])]),
            entries: None,
        };
        assert_eq!(resolve_socket_owners(&mapper, &[300, 100, 200])[&7], 100);
        assert_eq!(resolve_socket_owners(&mapper, &[200, 300, 100])[&7], 100);
    }

    #[test]
    fn test_map_ports_ignores_foreign_sockets() {
        let owners = HashMap::from([(10, 1), (20, 2)]);
        let entries = vec![
            row(Protocol::Tcp, 80, 10),
            row(Protocol::Tcp, 22, 99),
            row(Protocol::Udp, 53, 20),
        ];
        let ports = map_ports(&owners, &entries);
        assert_eq!(ports, PortOwnership::from([(80, 1), (53, 2)]));
    }

    #[test]
    fn test_tcp_and_udp_share_port_namespace() {
        let owners = HashMap::from([(10, 1), (20, 2)]);
        let entries = vec![row(Protocol::Tcp, 8080, 10), row(Protocol::Udp, 8080, 20)];
        let ports = map_ports(&owners, &entries);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[&8080], 2);
    }

    #[test]
    fn test_resolve_port_ownership() {
        let mapper = FakeMapper {
            sockets: HashMap::from([(100, vec![1]), (200, vec![2])]),
            entries: Some(vec![row(Protocol::Tcp, 443, 1), row(Protocol::Udp, 5353, 2)]),
        };
        let ports = resolve_port_ownership(&mapper, &[100, 200]);
        assert_eq!(ports, PortOwnership::from([(443, 100), (5353, 200)]));
    }

    #[test]
    fn test_unreadable_tables_yield_empty_map() {
        let mapper = FakeMapper {
            sockets: HashMap::from([(100, vec![1])]),
            entries: None,
        };
        assert!(resolve_port_ownership(&mapper, &[100]).is_empty());
    }

    #[test]
    fn test_no_sockets_yield_empty_map() {
        let mapper = FakeMapper {
            sockets: HashMap::new(),
            entries: Some(vec![row(Protocol::Tcp, 443, 1)]),
        };
        assert!(resolve_port_ownership(&mapper, &[100]).is_empty());
    }
}
