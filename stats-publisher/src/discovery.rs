//! Host identification for the publisher context
//!
//! Picks the machine's host name and a primary address, preferring
//! Ethernet over WiFi over anything else, IPv4 before IPv6.

use anyhow::{Context, Result};
use if_addrs::{get_if_addrs, IfAddr, Interface};
use std::net::IpAddr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub host_name: String,
    pub address: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InterfaceClass {
    Ethernet,
    Wireless,
    Other,
}

impl HostInfo {
    pub fn discover() -> Result<Self> {
        let host_name = gethostname::gethostname().to_string_lossy().to_string();

        let interfaces = get_if_addrs().context("Failed to enumerate network interfaces")?;
        let address = select_primary_address(&interfaces);

        match address {
            Some(ip) => info!("Discovered host {} at {}", host_name, ip),
            None => warn!("Discovered host {} without a usable network address", host_name),
        }

        Ok(HostInfo { host_name, address })
    }
}

fn classify(name: &str) -> InterfaceClass {
    let name = name.to_lowercase();
    if name.contains("wlan") || name.contains("wifi") || name.starts_with("wl") {
        InterfaceClass::Wireless
    } else if name.starts_with("eth") || name.starts_with("en") {
        InterfaceClass::Ethernet
    } else {
        InterfaceClass::Other
    }
}

fn select_primary_address(interfaces: &[Interface]) -> Option<IpAddr> {
    let mut candidates: Vec<(InterfaceClass, bool, &Interface)> = interfaces
        .iter()
        .filter(|i| !i.is_loopback())
        .map(|i| (classify(&i.name), matches!(i.addr, IfAddr::V6(_)), i))
        .collect();
    candidates.sort_by_key(|(class, is_v6, _)| (*class, *is_v6));

    candidates.first().map(|(class, _, interface)| {
        debug!("Primary interface: {} ({:?})", interface.name, class);
        interface.ip()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_classification() {
        assert_eq!(classify("eth0"), InterfaceClass::Ethernet);
        assert_eq!(classify("enp3s0"), InterfaceClass::Ethernet);
        assert_eq!(classify("wlan0"), InterfaceClass::Wireless);
        assert_eq!(classify("wlp2s0"), InterfaceClass::Wireless);
        assert_eq!(classify("docker0"), InterfaceClass::Other);
    }

    #[test]
    fn test_discover_host_name() {
        let host = HostInfo::discover().unwrap();
        assert!(!host.host_name.is_empty());
    }
}
