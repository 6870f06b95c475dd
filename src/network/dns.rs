//! Reverse name resolution

use dns_lookup::lookup_addr;
use std::net::{IpAddr, Ipv4Addr};

/// Best-effort reverse lookup. Implementations may block; callers run them
/// on the blocking pool with a timeout.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Resolver backed by the system resolver (reverse DNS, hosts file, mDNS
/// where the OS provides it)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn resolve(&self, ip: Ipv4Addr) -> Option<String> {
        reverse_lookup(ip)
    }
}

/// Perform reverse DNS lookup for a single IP address
pub fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    match lookup_addr(&IpAddr::V4(ip)) {
        // The resolver echoes the address back when it has no name
        Ok(hostname) if hostname != ip.to_string() => Some(hostname),
        _ => None,
    }
}
