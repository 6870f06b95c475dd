//! OS neighbor (ARP) table access and validation
//!
//! Reads `/proc/net/arp` on Linux and falls back to `arp -a` elsewhere. Both
//! the Windows and the BSD/macOS flavours of `arp -a` output are understood.

use anyhow::{Context, Result};
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::process::Command;

/// How the OS learned a neighbor entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborKind {
    /// Learned from traffic; evidence the host answered recently
    Dynamic,
    /// Configured or permanent; says nothing about freshness
    Static,
    /// Resolution pending or failed
    Incomplete,
}

/// One row of the neighbor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: Option<MacAddr>,
    pub kind: NeighborKind,
}

/// Why a neighbor entry cannot be used as discovery evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborRejection {
    Incomplete,
    ZeroAddress,
    BroadcastAddress,
    StaticEntry,
}

impl fmt::Display for NeighborRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighborRejection::Incomplete => write!(f, "incomplete entry"),
            NeighborRejection::ZeroAddress => write!(f, "all-zero hardware address"),
            NeighborRejection::BroadcastAddress => write!(f, "broadcast hardware address"),
            NeighborRejection::StaticEntry => write!(f, "stale static entry"),
        }
    }
}

/// Source of neighbor-table rows. Implementations may block.
pub trait NeighborTable: Send + Sync {
    fn entries(&self) -> Result<Vec<NeighborEntry>>;

    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<NeighborEntry>> {
        Ok(self.entries()?.into_iter().find(|entry| entry.ip == ip))
    }
}

/// The neighbor table of the running OS
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNeighborTable;

impl NeighborTable for SystemNeighborTable {
    fn entries(&self) -> Result<Vec<NeighborEntry>> {
        if cfg!(target_os = "linux") {
            let content = std::fs::read_to_string("/proc/net/arp")
                .context("Failed to read /proc/net/arp")?;
            return Ok(parse_proc_net_arp(&content));
        }

        let output = Command::new("arp")
            .arg("-a")
            .output()
            .context("Failed to run 'arp -a'")?;
        Ok(parse_arp_command_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Accepts only complete, dynamic, unicast entries.
pub fn validate_neighbor_entry(entry: &NeighborEntry) -> Result<MacAddr, NeighborRejection> {
    let mac = match (entry.kind, entry.mac) {
        (NeighborKind::Incomplete, _) | (_, None) => return Err(NeighborRejection::Incomplete),
        (_, Some(mac)) => mac,
    };

    if mac == MacAddr::zero() {
        return Err(NeighborRejection::ZeroAddress);
    }
    if mac == MacAddr::broadcast() {
        return Err(NeighborRejection::BroadcastAddress);
    }
    if entry.kind == NeighborKind::Static {
        return Err(NeighborRejection::StaticEntry);
    }

    Ok(mac)
}

/// Parses `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` and the zero-stripped
/// macOS form `0:1b:2:3:4:5`.
pub fn parse_mac(raw: &str) -> Option<MacAddr> {
    let parts: Vec<&str> = raw.trim().split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }

    let mut bytes = [0u8; 6];
    for (byte, part) in bytes.iter_mut().zip(parts) {
        if part.is_empty() || part.len() > 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }

    Some(MacAddr::new(
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
    ))
}

/// Canonical lowercase, colon-separated form used as device identity
pub fn normalize_mac(raw: &str) -> Option<String> {
    parse_mac(raw).map(|mac| mac.to_string())
}

/// Parses the Linux `/proc/net/arp` table
pub fn parse_proc_net_arp(content: &str) -> Vec<NeighborEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let ip = fields[0].parse::<Ipv4Addr>().ok()?;
            let flags = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).ok()?;

            let kind = if flags & 0x2 == 0 {
                NeighborKind::Incomplete
            } else if flags & 0x4 != 0 {
                NeighborKind::Static
            } else {
                NeighborKind::Dynamic
            };

            Some(NeighborEntry {
                ip,
                mac: parse_mac(fields[3]),
                kind,
            })
        })
        .collect()
}

/// Parses `arp -a` output from Windows, BSD, macOS or net-tools.
pub fn parse_arp_command_output(output: &str) -> Vec<NeighborEntry> {
    output
        .lines()
        .filter_map(|line| parse_bsd_arp_line(line).or_else(|| parse_windows_arp_line(line)))
        .collect()
}

// Format: hostname (ip) at mac [ether] on interface [permanent|PERM]
fn parse_bsd_arp_line(line: &str) -> Option<NeighborEntry> {
    let ip = line
        .split('(')
        .nth(1)?
        .split(')')
        .next()?
        .trim()
        .parse::<Ipv4Addr>()
        .ok()?;

    let mac_str = line.split(" at ").nth(1)?.split_whitespace().next()?;
    let mac = parse_mac(mac_str);

    let lower = line.to_ascii_lowercase();
    let kind = if mac.is_none() {
        NeighborKind::Incomplete
    } else if lower.contains("permanent") || lower.contains(" perm") || lower.contains("static") {
        NeighborKind::Static
    } else {
        NeighborKind::Dynamic
    };

    Some(NeighborEntry { ip, mac, kind })
}

// Format: "  192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic"
fn parse_windows_arp_line(line: &str) -> Option<NeighborEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return None;
    }
    let ip = fields[0].parse::<Ipv4Addr>().ok()?;
    let mac = parse_mac(fields[1]);

    let kind = match (fields[2].to_ascii_lowercase().as_str(), mac) {
        (_, None) => NeighborKind::Incomplete,
        ("dynamic", Some(_)) => NeighborKind::Dynamic,
        ("static", Some(_)) => NeighborKind::Static,
        _ => return None,
    };

    Some(NeighborEntry { ip, mac, kind })
}
