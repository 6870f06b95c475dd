//! Subnet arithmetic and host enumeration

use ipnetwork::{Ipv4Network, ipv4_mask_to_prefix};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Address or mask input that cannot describe an IPv4 subnet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAddressError {
    #[error("malformed IPv4 address '{0}': expected four octets in 0-255")]
    Malformed(String),
    #[error("subnet mask {0} is not contiguous")]
    NonContiguousMask(Ipv4Addr),
}

/// Parses a dotted-quad string, rejecting anything but four decimal octets
pub fn parse_dotted_quad(raw: &str) -> Result<Ipv4Addr, InvalidAddressError> {
    let malformed = || InvalidAddressError::Malformed(raw.to_string());

    let mut octets = [0u8; 4];
    let mut parts = raw.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(malformed)?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        *octet = part.parse::<u8>().map_err(|_| malformed())?;
    }
    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok(Ipv4Addr::from(octets))
}

/// Converts a mask to its prefix length, rejecting non-contiguous masks
pub fn mask_to_prefix(mask: Ipv4Addr) -> Result<u8, InvalidAddressError> {
    ipv4_mask_to_prefix(mask).map_err(|_| InvalidAddressError::NonContiguousMask(mask))
}

/// Network address: address AND mask
pub fn network_address(address: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(address) & u32::from(mask))
}

/// Broadcast address: address OR NOT mask
pub fn broadcast_address(address: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(address) | !u32::from(mask))
}

/// Number of addresses strictly between network and broadcast
pub fn usable_host_count(mask: Ipv4Addr) -> u64 {
    let span = u64::from(!u32::from(mask)) + 1;
    span.saturating_sub(2)
}

/// Checks if an IP address is the network or broadcast address of a subnet
pub fn is_special_address(ip: Ipv4Addr, subnet: &Ipv4Network) -> bool {
    ip == subnet.network() || ip == subnet.broadcast()
}

/// True if `candidate` shares the network address of `address`/`mask`
pub fn in_same_subnet(candidate: Ipv4Addr, address: Ipv4Addr, mask: Ipv4Addr) -> bool {
    network_address(candidate, mask) == network_address(address, mask)
}

/// Usable host addresses of a subnet, produced lazily in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    next: u64,
    end: u64,
}

impl HostRange {
    fn between(first: u32, last: u32) -> Self {
        Self {
            next: u64::from(first) + 1,
            end: u64::from(last).max(u64::from(first) + 1),
        }
    }

    /// Number of addresses not yet yielded
    pub fn host_count(&self) -> u64 {
        self.end - self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == self.end
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        (self.next..self.end).contains(&u64::from(u32::from(ip)))
    }

    fn first_host(&self) -> Option<u32> {
        (!self.is_empty()).then_some(self.next as u32)
    }
}

impl Iterator for HostRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next >= self.end {
            return None;
        }
        let ip = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(ip)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.host_count()).unwrap_or(usize::MAX);
        (remaining, usize::try_from(self.host_count()).ok())
    }
}

impl DoubleEndedIterator for HostRange {
    fn next_back(&mut self) -> Option<Ipv4Addr> {
        if self.next >= self.end {
            return None;
        }
        self.end -= 1;
        Some(Ipv4Addr::from(self.end as u32))
    }
}

/// Every usable host address of the subnet (network and broadcast excluded)
pub fn enumerate_hosts(address: Ipv4Addr, mask: Ipv4Addr) -> Result<HostRange, InvalidAddressError> {
    mask_to_prefix(mask)?;

    let first = u32::from(network_address(address, mask));
    let last = u32::from(broadcast_address(address, mask));
    Ok(HostRange::between(first, last))
}

/// String-input variant of [`enumerate_hosts`]
pub fn enumerate_hosts_str(address: &str, mask: &str) -> Result<HostRange, InvalidAddressError> {
    enumerate_hosts(parse_dotted_quad(address)?, parse_dotted_quad(mask)?)
}

/// Limits a host range to `max_hosts`, centering the window on `local_ip`
pub fn limit_scan_window(hosts: HostRange, local_ip: Ipv4Addr, max_hosts: usize) -> Vec<Ipv4Addr> {
    let total = hosts.host_count();
    let cap = max_hosts as u64;
    let Some(first) = hosts.first_host() else {
        return Vec::new();
    };
    if total <= cap {
        return hosts.collect();
    }

    tracing::warn!(
        "Subnet has {} hosts, limiting scan to {} hosts around {}",
        total,
        max_hosts,
        local_ip
    );

    let center_index = if hosts.contains(local_ip) {
        u64::from(u32::from(local_ip) - first)
    } else {
        total / 2
    };
    let start = center_index.saturating_sub(cap / 2).min(total - cap);

    let window_first = u64::from(first) + start;
    HostRange {
        next: window_first,
        end: window_first + cap,
    }
    .collect()
}

#[cfg(test)]
#[path = "subnet_tests.rs"]
mod subnet_tests;
