//! Capture interface discovery.

use pnet::datalink::{self, NetworkInterface};

/// Name prefixes of physical adapters under predictable interface naming
/// (onboard, hotplug slot, PCI path)
pub const PHYSICAL_PREFIXES: [&str; 3] = ["ens", "eno", "enp"];

pub fn default_prefixes() -> Vec<String> {
    PHYSICAL_PREFIXES.iter().map(|p| p.to_string()).collect()
}

pub fn is_physical_name(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Keep interfaces that are administratively up, not loopback, and named
/// like a physical adapter. Enumeration order is preserved.
pub fn select_capture_interfaces(interfaces: &[NetworkInterface], prefixes: &[String]) -> Vec<String> {
    interfaces
        .iter()
        .filter(|iface| {
            iface.is_up() && !iface.is_loopback() && is_physical_name(&iface.name, prefixes)
        })
        .map(|iface| iface.name.clone())
        .collect()
}

/// Enumerate the host's capture interfaces
pub fn discover_interfaces(prefixes: &[String]) -> Vec<String> {
    let interfaces = datalink::interfaces();
    log::debug!("Enumerated {} interfaces", interfaces.len());

    let selected = select_capture_interfaces(&interfaces, prefixes);
    if selected.is_empty() {
        log::info!("No physical interface is up; nothing to capture");
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, flags: i32) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips: Vec::new(),
            flags: flags as u32,
        }
    }

    #[test]
    fn test_physical_names() {
        let prefixes = default_prefixes();
        assert!(is_physical_name("ens33", &prefixes));
        assert!(is_physical_name("eno1", &prefixes));
        assert!(is_physical_name("enp0s31f6", &prefixes));
        assert!(!is_physical_name("eth0", &prefixes));
        assert!(!is_physical_name("docker0", &prefixes));
        assert!(!is_physical_name("lo", &prefixes));
    }

    #[test]
    fn test_select_capture_interfaces() {
        let up = libc::IFF_UP;
        let interfaces = vec![
            iface("lo", up | libc::IFF_LOOPBACK),
            iface("enp3s0", up),
            iface("veth12ab", up),
            iface("ens1", 0),
            iface("br-1f2e", up),
            iface("eno1", up),
        ];

        assert_eq!(
            select_capture_interfaces(&interfaces, &default_prefixes()),
            vec!["enp3s0".to_string(), "eno1".to_string()]
        );
    }

    #[test]
    fn test_custom_prefixes() {
        let interfaces = vec![iface("eth0", libc::IFF_UP), iface("enp3s0", libc::IFF_UP)];
        assert_eq!(
            select_capture_interfaces(&interfaces, &["eth".to_string()]),
            vec!["eth0".to_string()]
        );
        assert!(select_capture_interfaces(&interfaces, &[]).is_empty());
    }
}
