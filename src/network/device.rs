//! Device class inference
//!
//! Classifies devices from their vendor string and resolved name. The
//! pattern lists are approximate, so classification sits behind the
//! [`DeviceClassifier`] trait and can be swapped wholesale.

use serde::{Deserialize, Serialize};

/// Device class enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    Router,
    AccessPoint,
    Pc,
    Laptop,
    Mobile,
    Tablet,
    Server,
    Nas,
    SmartTv,
    Printer,
    Camera,
    GameConsole,
    IotDevice,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Router => "ROUTER",
            DeviceClass::AccessPoint => "ACCESS_POINT",
            DeviceClass::Pc => "PC",
            DeviceClass::Laptop => "LAPTOP",
            DeviceClass::Mobile => "MOBILE",
            DeviceClass::Tablet => "TABLET",
            DeviceClass::Server => "SERVER",
            DeviceClass::Nas => "NAS",
            DeviceClass::SmartTv => "SMART_TV",
            DeviceClass::Printer => "PRINTER",
            DeviceClass::Camera => "CAMERA",
            DeviceClass::GameConsole => "GAME_CONSOLE",
            DeviceClass::IotDevice => "IOT_DEVICE",
            DeviceClass::Unknown => "UNKNOWN",
        }
    }
}

/// Strategy turning probe evidence into a [`DeviceClass`]
pub trait DeviceClassifier: Send + Sync {
    fn classify(&self, vendor: Option<&str>, hostname: Option<&str>, is_gateway: bool)
    -> DeviceClass;
}

/// Ordered pattern lists matched as lowercase substrings
pub struct HeuristicClassifier {
    vendor_patterns: Vec<(DeviceClass, Vec<&'static str>)>,
    hostname_patterns: Vec<(DeviceClass, Vec<&'static str>)>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            vendor_patterns: vec![
                (
                    DeviceClass::Router,
                    vec![
                        "cisco", "juniper", "mikrotik", "netgear", "tp-link", "d-link",
                        "linksys", "zte", "sagemcom", "technicolor", "avm",
                    ],
                ),
                (
                    DeviceClass::AccessPoint,
                    vec!["ubiquiti", "aruba", "ruckus", "meraki", "unifi"],
                ),
                (
                    DeviceClass::Mobile,
                    vec![
                        "apple", "samsung", "xiaomi", "huawei", "oppo", "vivo", "oneplus",
                        "realme", "motorola",
                    ],
                ),
                (
                    DeviceClass::Pc,
                    vec![
                        "dell", "lenovo", "hewlett", "hp inc", "acer", "asustek", "msi",
                        "gigabyte", "intel",
                    ],
                ),
                (DeviceClass::Server, vec!["supermicro", "vmware"]),
                (DeviceClass::Nas, vec!["synology", "qnap", "western digital"]),
                (
                    DeviceClass::SmartTv,
                    vec!["lg electronics", "sony", "tcl", "hisense", "roku"],
                ),
                (
                    DeviceClass::Printer,
                    vec!["canon", "epson", "brother", "xerox", "ricoh", "lexmark"],
                ),
                (
                    DeviceClass::Camera,
                    vec!["hikvision", "dahua", "axis", "wyze", "arlo", "reolink"],
                ),
                (DeviceClass::GameConsole, vec!["nintendo"]),
                (
                    DeviceClass::IotDevice,
                    vec!["espressif", "tuya", "shelly", "sonoff", "signify", "amazon technologies"],
                ),
            ],
            hostname_patterns: vec![
                (DeviceClass::Tablet, vec!["ipad", "tablet", "tab-"]),
                (
                    DeviceClass::Mobile,
                    vec!["iphone", "android", "galaxy", "pixel", "redmi", "oneplus"],
                ),
                (
                    DeviceClass::Laptop,
                    vec!["laptop", "notebook", "macbook", "thinkpad", "surface"],
                ),
                (DeviceClass::Pc, vec!["desktop", "workstation", "pc-", "-pc", "imac"]),
                (DeviceClass::Nas, vec!["nas", "diskstation", "synology", "qnap"]),
                (DeviceClass::Server, vec!["server", "srv", "proxmox"]),
                (DeviceClass::Router, vec!["router", "gateway", "fritz.box", "gw-"]),
                (DeviceClass::AccessPoint, vec!["ap-", "accesspoint", "extender"]),
                (DeviceClass::Printer, vec!["printer", "prn-", "mfp-"]),
                (DeviceClass::Camera, vec!["camera", "cam-", "ipcam", "nvr"]),
                (
                    DeviceClass::SmartTv,
                    vec!["tv-", "smarttv", "roku", "firetv", "chromecast", "appletv"],
                ),
                (
                    DeviceClass::GameConsole,
                    vec!["xbox", "playstation", "ps4", "ps5", "nintendo"],
                ),
                (DeviceClass::IotDevice, vec!["esp-", "esp32", "shelly", "tasmota", "sonoff"]),
            ],
        }
    }
}

impl HeuristicClassifier {
    pub fn classify_vendor(&self, vendor: &str) -> Option<DeviceClass> {
        first_match(&self.vendor_patterns, vendor)
    }

    pub fn classify_hostname(&self, hostname: &str) -> Option<DeviceClass> {
        first_match(&self.hostname_patterns, hostname)
    }
}

impl DeviceClassifier for HeuristicClassifier {
    fn classify(
        &self,
        vendor: Option<&str>,
        hostname: Option<&str>,
        is_gateway: bool,
    ) -> DeviceClass {
        if is_gateway {
            return DeviceClass::Router;
        }

        // Names are more specific than vendor families (an Apple OUI covers
        // phones, tablets and laptops alike).
        if let Some(h) = hostname
            && let Some(class) = self.classify_hostname(h)
        {
            return class;
        }

        if let Some(v) = vendor
            && let Some(class) = self.classify_vendor(v)
        {
            return class;
        }

        DeviceClass::Unknown
    }
}

fn first_match(patterns: &[(DeviceClass, Vec<&'static str>)], value: &str) -> Option<DeviceClass> {
    let lower = value.to_lowercase();
    patterns
        .iter()
        .find(|(_, needles)| contains_any(&lower, needles))
        .map(|(class, _)| *class)
}

fn contains_any(s: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| s.contains(p))
}
