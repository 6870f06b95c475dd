//! Network interface detection and selection

use ipnetwork::Ipv4Network;
use pnet::datalink;
use pnet::util::MacAddr;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Command;
use std::sync::Mutex;

use crate::models::NetworkInterfaceSnapshot;

/// Logs a message using structured tracing.
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!("{}", format!($($arg)*))
    };
}

/// Supplies the currently active interface, if any
pub trait InterfaceProvider: Send + Sync {
    fn current_interface(&self) -> Option<NetworkInterfaceSnapshot>;
}

/// Provider whose snapshot is set explicitly (embedding hosts, tests)
#[derive(Debug, Default)]
pub struct FixedInterfaceProvider {
    snapshot: Mutex<Option<NetworkInterfaceSnapshot>>,
}

impl FixedInterfaceProvider {
    pub fn new(snapshot: Option<NetworkInterfaceSnapshot>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: Option<NetworkInterfaceSnapshot>) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = snapshot;
        }
    }
}

impl InterfaceProvider for FixedInterfaceProvider {
    fn current_interface(&self) -> Option<NetworkInterfaceSnapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Picks the best physical IPv4 interface of the running OS
#[derive(Debug, Default, Clone)]
pub struct SystemInterfaceProvider {
    preferred: Option<String>,
}

impl SystemInterfaceProvider {
    /// `preferred` pins selection to an interface name
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }
}

impl InterfaceProvider for SystemInterfaceProvider {
    fn current_interface(&self) -> Option<NetworkInterfaceSnapshot> {
        let mut candidates = collect_candidates(&datalink::interfaces());
        if let Some(name) = &self.preferred {
            candidates.retain(|c| &c.name == name);
        }
        candidates.sort_by_key(|c| std::cmp::Reverse(interface_score(&c.address)));

        let best = candidates.into_iter().next()?;
        log_debug!(
            "Selected interface: {} (IP: {}/{}, MAC: {})",
            best.name,
            best.address,
            best.network.prefix(),
            best.mac
        );

        let gateway = default_gateway(&best.name).unwrap_or_else(|| {
            // Most home and hotspot routers take the first host address
            Ipv4Addr::from(u32::from(best.network.network()) + 1)
        });

        Some(NetworkInterfaceSnapshot {
            wireless_network: wireless_network_name(&best.name),
            name: best.name,
            address: best.address,
            subnet_mask: best.network.mask(),
            gateway,
            mac: best.mac.to_string(),
        })
    }
}

struct Candidate {
    name: String,
    address: Ipv4Addr,
    network: Ipv4Network,
    mac: MacAddr,
}

fn is_virtual_adapter_name(name_lower: &str) -> bool {
    name_lower.contains("hyper-v")
        || name_lower.contains("vmware")
        || name_lower.contains("virtualbox")
        || name_lower.contains("docker")
        || name_lower.contains("vethernet")
        || name_lower.contains("wsl")
        || name_lower.starts_with("veth")
        || name_lower.starts_with("br-")
}

fn collect_candidates(interfaces: &[datalink::NetworkInterface]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for pnet_if in interfaces {
        if pnet_if.is_loopback() {
            continue;
        }

        let has_usable_ipv4 = pnet_if.ips.iter().any(|ip_network| match ip_network.ip() {
            IpAddr::V4(ipv4) => is_usable_address(ipv4, ip_network.prefix()),
            IpAddr::V6(_) => false,
        });
        // On Windows `is_up()` can be false even for usable adapters.
        if !pnet_if.is_up() && !(cfg!(target_os = "windows") && has_usable_ipv4) {
            log_debug!("Skipping down adapter: {}", pnet_if.name);
            continue;
        }

        let mac = match pnet_if.mac {
            Some(m) if m != MacAddr::zero() => m,
            _ => continue,
        };

        if is_virtual_adapter_name(&pnet_if.name.to_lowercase()) {
            log_debug!("Skipping virtual adapter: {}", pnet_if.name);
            continue;
        }

        for ip_network in &pnet_if.ips {
            let IpAddr::V4(ipv4) = ip_network.ip() else {
                continue;
            };
            if !is_usable_address(ipv4, ip_network.prefix()) {
                continue;
            }
            let Ok(network) = Ipv4Network::new(ipv4, ip_network.prefix()) else {
                continue;
            };

            candidates.push(Candidate {
                name: pnet_if.name.clone(),
                address: ipv4,
                network,
                mac,
            });
        }
    }

    candidates
}

fn is_usable_address(ipv4: Ipv4Addr, prefix: u8) -> bool {
    !ipv4.is_unspecified() && prefix > 0 && !ipv4.is_link_local()
}

/// List valid interface names in priority order.
pub fn list_interfaces() -> Vec<String> {
    let mut candidates = collect_candidates(&datalink::interfaces());
    candidates.sort_by_key(|c| std::cmp::Reverse(interface_score(&c.address)));

    let mut names: Vec<String> = Vec::new();
    for candidate in candidates {
        if !names.contains(&candidate.name) {
            names.push(candidate.name);
        }
    }
    names
}

/// Scores an IP address for interface selection priority
pub fn interface_score(ip: &Ipv4Addr) -> u32 {
    let octets = ip.octets();
    match octets[0] {
        192 if octets[1] == 168 => 100,
        10 => 90,
        172 if (16..=31).contains(&octets[1]) => 50, // often a container bridge
        _ => 70,
    }
}

fn default_gateway(interface_name: &str) -> Option<Ipv4Addr> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let content = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_default_gateway(&content, interface_name)
}

/// Finds the default route of `interface_name` in `/proc/net/route` content
pub fn parse_default_gateway(content: &str, interface_name: &str) -> Option<Ipv4Addr> {
    content.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[0] != interface_name || fields[1] != "00000000" {
            return None;
        }
        // Stored in host (little-endian) byte order
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        let gateway = Ipv4Addr::from(raw.to_le_bytes());
        (!gateway.is_unspecified()).then_some(gateway)
    })
}

fn wireless_network_name(interface_name: &str) -> Option<String> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let output = Command::new("iwgetid")
        .args([interface_name, "-r"])
        .output()
        .ok()?;
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !name.is_empty()).then_some(name)
}
