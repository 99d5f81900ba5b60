//! Packet classification against the port ownership map.
//!
//! A frame is reduced to the few facts attribution needs (IPv4 present,
//! transport ports, length) and then matched: a known source port makes it
//! transmit traffic of that port's owner, otherwise a known destination port
//! makes it receive traffic. Only IPv4 frames are attributed.

use crate::flow::Direction;
use crate::ports::PortOwnership;
use crate::process::Pid;
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;

/// What attribution needs to know about one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    /// Captured length in bytes
    pub length: usize,
    pub has_ipv4: bool,
    /// (source, destination) of a TCP or UDP layer
    pub ports: Option<(u16, u16)>,
}

/// Decode an Ethernet frame down to its transport ports
pub fn summarize_frame(frame: &[u8]) -> FrameSummary {
    let mut summary = FrameSummary {
        length: frame.len(),
        has_ipv4: false,
        ports: None,
    };

    let Some(ethernet) = EthernetPacket::new(frame) else {
        return summary;
    };

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            if let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) {
                summary.has_ipv4 = true;
                // Later fragments carry payload bytes, not a transport header
                if ipv4.get_fragment_offset() == 0 {
                    summary.ports =
                        transport_ports(ipv4.get_next_level_protocol(), ipv4.payload());
                }
            }
        }
        EtherTypes::Ipv6 => {
            if let Some(ipv6) = Ipv6Packet::new(ethernet.payload()) {
                summary.ports = transport_ports(ipv6.get_next_header(), ipv6.payload());
            }
        }
        _ => {}
    }

    summary
}

fn transport_ports(protocol: IpNextHeaderProtocol, payload: &[u8]) -> Option<(u16, u16)> {
    match protocol {
        IpNextHeaderProtocols::Tcp => {
            TcpPacket::new(payload).map(|tcp| (tcp.get_source(), tcp.get_destination()))
        }
        IpNextHeaderProtocols::Udp => {
            UdpPacket::new(payload).map(|udp| (udp.get_source(), udp.get_destination()))
        }
        _ => None,
    }
}

/// Decide which owner, if any, a frame is charged to.
///
/// The source port is checked first. A frame whose source port is owned but
/// that lacks IPv4 is not attributed at all; its destination is not tried.
pub fn classify(summary: &FrameSummary, ports: &PortOwnership) -> Option<(Pid, Direction)> {
    let (src_port, dst_port) = summary.ports?;

    if let Some(&pid) = ports.get(&src_port) {
        summary.has_ipv4.then_some((pid, Direction::Transmit))
    } else if let Some(&pid) = ports.get(&dst_port) {
        summary.has_ipv4.then_some((pid, Direction::Receive))
    } else {
        None
    }
}
