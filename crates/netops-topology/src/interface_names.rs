//! Interface name handling.
//!
//! Three distinct shapes are needed: the expanded form for matching against
//! running-config (`Gi0/0/0/1` → `GigabitEthernet0/0/0/1`), the abbreviated
//! canonical form used as the interface-table key (`GigabitEthernet0/0/0/0`
//! → `Gi0/0/0/0`), and a compact form for link ids
//! (`GigabitEthernet0/0/0/1` → `Gi0001`).

use regex::Regex;

lazy_static! {
    static ref GARBAGE_SUFFIX: Regex = Regex::new(r"(?i)(Holdtime|Capability).*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

// Full names first so an already-expanded name passes through untouched.
const FULL_NAMES: &[&str] = &[
    "HundredGigE",
    "FortyGigE",
    "TwentyFiveGigE",
    "TenGigE",
    "GigabitEthernet",
    "FastEthernet",
    "Bundle-Ether",
    "Loopback",
    "MgmtEth",
    "BVI",
    "tunnel-ip",
    "tunnel-te",
    "NVE",
];

const EXPANSIONS: &[(&str, &str)] = &[
    ("Hu", "HundredGigE"),
    ("Fo", "FortyGigE"),
    ("Tf", "TwentyFiveGigE"),
    ("Te", "TenGigE"),
    ("Gi", "GigabitEthernet"),
    ("Fa", "FastEthernet"),
    ("BE", "Bundle-Ether"),
    ("Lo", "Loopback"),
    ("Mg", "MgmtEth"),
];

// Canonical abbreviated forms, matched case-insensitively against the
// uppercased name. Longer prefixes first.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("TENGIGABITETHERNET", "Te"),
    ("HUNDREDGIGE", "Hu"),
    ("FORTYGIGE", "Fo"),
    ("TWENTYFIVEGIGE", "Tf"),
    ("TENGIGE", "Te"),
    ("GIGABITETHERNET", "Gi"),
    ("FASTETHERNET", "Fa"),
    ("BUNDLE-ETHER", "BE"),
    ("LOOPBACK", "Lo"),
    ("MGMTETH", "Mg"),
    ("NULL", "Nu"),
];

const SHORTEN_FOR_ID: &[(&str, &str)] = &[
    ("HundredGigE", "Hu"),
    ("FortyGigE", "Fo"),
    ("TwentyFiveGigE", "Tf"),
    ("TenGigE", "Te"),
    ("GigabitEthernet", "Gi"),
    ("Bundle-Ether", "BE"),
    ("Loopback", "Lo"),
    ("MgmtEth", "Mg"),
    ("BVI", "BVI"),
    ("tunnel-ip", "tip"),
    ("tunnel-te", "tte"),
    ("NVE", "NVE"),
];

/// Strip whitespace, CRs and garbled CDP suffixes (`...\nHoldtime`,
/// `...Capability`) from an interface name.
pub fn clean_interface_name(interface: &str) -> String {
    let cleaned = interface.replace(['\n', '\r', '\t'], "");
    let cleaned = GARBAGE_SUFFIX.replace(&cleaned, "");
    WHITESPACE.replace_all(cleaned.trim(), "").into_owned()
}

/// Expand an abbreviated name to its full IOS-XR form for matching against
/// running-config interface names.
pub fn expand_interface_name(interface: &str) -> String {
    for full in FULL_NAMES {
        if interface.starts_with(full) {
            return interface.to_string();
        }
    }
    for (abbrev, full) in EXPANSIONS {
        if interface.starts_with(abbrev) {
            return interface.replacen(abbrev, full, 1);
        }
    }
    interface.to_string()
}

/// Normalize to the abbreviated canonical form used as the interface-table
/// key, so `GigabitEthernet0/0/0/0` and `Gi0/0/0/0` collapse to one row.
/// Idempotent; also cleans CDP garbage and normalizes subinterface parents.
pub fn normalize_interface_name(interface: &str) -> String {
    let cleaned = clean_interface_name(interface);
    if cleaned.is_empty() {
        return cleaned;
    }

    let (parent, sub_suffix) = match cleaned.split_once('.') {
        Some((parent, sub)) => (parent.to_string(), format!(".{}", sub)),
        None => (cleaned.clone(), String::new()),
    };

    let upper = parent.to_uppercase();
    for (full, abbrev) in ABBREVIATIONS {
        if upper.starts_with(full) {
            let remainder = &parent[full.len()..];
            return format!("{}{}{}", abbrev, remainder, sub_suffix);
        }
    }

    format!("{}{}", parent, sub_suffix)
}

/// Compact form for use inside link ids; slashes removed.
pub fn shorten_for_id(interface: &str) -> String {
    let mut result = interface.to_string();
    for (full, abbrev) in SHORTEN_FOR_ID {
        if interface.starts_with(full) {
            result = interface.replacen(full, abbrev, 1);
            break;
        }
    }
    result.replace('/', "")
}

/// Physical vs. logical: subinterfaces and bundle member references are
/// logical.
pub fn is_physical_interface(interface: &str) -> bool {
    if interface.contains('.') {
        return false;
    }
    if interface.starts_with("BE") && interface.contains('/') {
        return false;
    }
    true
}

/// Parent of a subinterface, if any.
pub fn parent_interface(interface: &str) -> Option<String> {
    interface
        .split_once('.')
        .map(|(parent, _)| parent.to_string())
}

/// Capacity class from the interface-type designation alone; never derived
/// from observed utilization. Bundles report `LAG` until real member data
/// supplies the aggregate.
pub fn capacity_from_interface_type(interface: &str) -> &'static str {
    let upper = interface.to_uppercase();
    if upper.starts_with("HUNDREDGIGE") || upper.starts_with("HU") {
        "100G"
    } else if upper.starts_with("FORTYGIGE") || upper.starts_with("FO") {
        "40G"
    } else if upper.starts_with("TWENTYFIVEGIGE") || upper.starts_with("TF") {
        "25G"
    } else if upper.starts_with("TENGIGABITETHERNET")
        || upper.starts_with("TENGIGE")
        || upper.starts_with("TE")
    {
        "10G"
    } else if upper.starts_with("GIGABITETHERNET") || upper.starts_with("GI") {
        "1G"
    } else if upper.starts_with("FASTETHERNET") || upper.starts_with("FA") {
        "100M"
    } else if upper.starts_with("BUNDLE-ETHER") || upper.starts_with("BE") {
        "LAG"
    } else if upper.starts_with("LOOPBACK") || upper.starts_with("LO") {
        "1G"
    } else {
        "1G"
    }
}

/// Nominal bandwidth in kbps for a capacity class.
pub fn hardware_bandwidth_kbps(capacity_class: &str) -> u64 {
    match capacity_class {
        "100G" => 100_000_000,
        "40G" => 40_000_000,
        "25G" => 25_000_000,
        "10G" => 10_000_000,
        "1G" => 1_000_000,
        "100M" => 100_000,
        "10M" => 10_000,
        // LAG bandwidth unknown without bundle data
        "LAG" => 0,
        _ => 1_000_000,
    }
}
