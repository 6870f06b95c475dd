//! Network module - interface capture, subnet arithmetic, neighbor table, name
//! resolution, vendor lookup and device classification

mod device;
mod dns;
mod interface;
mod neighbor;
mod subnet;
mod vendor;

pub use device::{DeviceClass, DeviceClassifier, HeuristicClassifier};
pub use dns::{NameResolver, SystemResolver, reverse_lookup};
pub use interface::{
    FixedInterfaceProvider, InterfaceProvider, SystemInterfaceProvider, interface_score,
    list_interfaces, parse_default_gateway,
};
pub use neighbor::{
    NeighborEntry, NeighborKind, NeighborRejection, NeighborTable, SystemNeighborTable,
    normalize_mac, parse_arp_command_output, parse_mac, parse_proc_net_arp,
    validate_neighbor_entry,
};
pub use subnet::{
    HostRange, InvalidAddressError, broadcast_address, enumerate_hosts, enumerate_hosts_str,
    in_same_subnet, is_special_address, limit_scan_window, mask_to_prefix, network_address,
    parse_dotted_quad, usable_host_count,
};
pub use vendor::{RANDOMIZED_VENDOR, VendorInfo, is_locally_administered, lookup_vendor_info};
