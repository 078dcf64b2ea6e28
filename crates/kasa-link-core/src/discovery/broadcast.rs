//! Subnet broadcast address resolution.

use std::net::Ipv4Addr;

use tracing::{debug, warn};

/// Broadcast address of the subnet `ip/netmask`.
pub fn broadcast_for(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Broadcast addresses of every non-loopback IPv4 interface.
///
/// Falls back to the limited broadcast address when enumeration fails or
/// finds nothing usable.
pub fn resolve() -> Vec<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "interface enumeration failed, using limited broadcast");
            return vec![Ipv4Addr::BROADCAST];
        }
    };

    let mut addresses: Vec<Ipv4Addr> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(
                v4.broadcast
                    .unwrap_or_else(|| broadcast_for(v4.ip, v4.netmask)),
            ),
            if_addrs::IfAddr::V6(_) => None,
        })
        .collect();

    addresses.sort();
    addresses.dedup();

    if addresses.is_empty() {
        debug!("no IPv4 interfaces found, using limited broadcast");
        addresses.push(Ipv4Addr::BROADCAST);
    }
    addresses
}
