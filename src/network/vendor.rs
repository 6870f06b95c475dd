//! MAC address vendor lookup using the OUI database

use mac_oui::Oui;
use std::sync::OnceLock;

/// Vendor string reported for locally administered addresses
pub const RANDOMIZED_VENDOR: &str = "Private Device (Randomized MAC)";

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn get_oui_db() -> Option<&'static Oui> {
    OUI_DB.get_or_init(|| Oui::default().ok()).as_ref()
}

/// Vendor lookup result with randomization detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorInfo {
    pub vendor: Option<String>,
    pub is_randomized: bool,
}

/// Check if MAC address is locally administered (randomized/virtual)
///
/// Bit 1 of the first octet: 0 = universally administered, 1 = locally administered.
pub fn is_locally_administered(mac: &str) -> bool {
    let normalized: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(2)
        .collect();

    if normalized.len() < 2 {
        return false;
    }

    u8::from_str_radix(&normalized, 16)
        .map(|first_byte| first_byte & 0x02 != 0)
        .unwrap_or(false)
}

/// Look up the vendor for a MAC address (expects the canonical colon form)
pub fn lookup_vendor_info(mac: &str) -> VendorInfo {
    if is_locally_administered(mac) {
        return VendorInfo {
            vendor: Some(RANDOMIZED_VENDOR.to_string()),
            is_randomized: true,
        };
    }

    let vendor = get_oui_db()
        .and_then(|db| db.lookup_by_mac(mac).ok().flatten())
        .map(|entry| entry.company_name.clone());

    VendorInfo {
        vendor,
        is_randomized: false,
    }
}
