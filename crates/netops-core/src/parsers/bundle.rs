use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref BUNDLE_HEADER: Regex = Regex::new(r"^(Bundle-Ether\d+|BE\d+)").unwrap();
    static ref STATUS_LINE: Regex = Regex::new(r"Status:\s+(\S+)").unwrap();
    static ref LOCAL_LINKS: Regex =
        Regex::new(r"Local links.*:\s+(\d+)\s*/\s*(\d+)\s*/\s*(\d+)").unwrap();
    static ref BANDWIDTH_LINE: Regex = Regex::new(r"(?i)bandwidth.*:\s+(\d+)").unwrap();
    static ref MEMBER_SECTION: Regex = Regex::new(r"(?i)Port\s+.*State").unwrap();
    static ref MEMBER_ROW: Regex = Regex::new(
        r"^\s*((?:Gi|Te|Hu|GigabitEthernet|TenGigE|HundredGigE)\S*)\s+(\w+)\s+(\w+)\s+\S+,\s+\S+\s+(\d+)"
    )
    .unwrap();
}

/// One member link of a Bundle-Ether (LAG).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMember {
    pub interface: String,
    /// Local or the LACP partner's system.
    pub device: String,
    pub state: String,
    pub speed_kbps: u64,
}

/// One bundle from `show bundle` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_name: String,
    pub status: String,
    #[serde(default)]
    pub active_links: u32,
    #[serde(default)]
    pub standby_links: u32,
    #[serde(default)]
    pub configured_links: u32,
    pub members: Vec<BundleMember>,
    pub total_bandwidth_kbps: u64,
    /// Sum of active member speeds.
    pub active_bandwidth_kbps: u64,
    pub capacity_class: String,
}

/// Capacity class for a LAG from its aggregated active bandwidth.
fn bundle_capacity_class(active_bw_kbps: u64) -> String {
    if active_bw_kbps >= 1_000_000 {
        format!("{}G", active_bw_kbps / 1_000_000)
    } else if active_bw_kbps >= 100_000 {
        "100M".to_string()
    } else if active_bw_kbps > 0 {
        format!("{}K", active_bw_kbps)
    } else {
        // No active members: aggregate capacity unknown
        "LAG".to_string()
    }
}

/// Parse IOS-XR `show bundle` output.
pub fn parse_bundles(output: &str) -> Vec<Bundle> {
    let mut bundles: Vec<Bundle> = Vec::new();
    let mut current: Option<Bundle> = None;
    let mut in_member_section = false;

    for line in output.lines() {
        if let Some(caps) = BUNDLE_HEADER.captures(line) {
            if let Some(bundle) = current.take() {
                bundles.push(bundle);
            }
            current = Some(Bundle {
                bundle_name: caps[1].to_string(),
                status: "Unknown".to_string(),
                active_links: 0,
                standby_links: 0,
                configured_links: 0,
                members: Vec::new(),
                total_bandwidth_kbps: 0,
                active_bandwidth_kbps: 0,
                capacity_class: "LAG".to_string(),
            });
            in_member_section = false;
            continue;
        }

        let Some(bundle) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = STATUS_LINE.captures(line) {
            bundle.status = caps[1].to_string();
        }
        if let Some(caps) = LOCAL_LINKS.captures(line) {
            bundle.active_links = caps[1].parse().unwrap_or(0);
            bundle.standby_links = caps[2].parse().unwrap_or(0);
            bundle.configured_links = caps[3].parse().unwrap_or(0);
        }
        if let Some(caps) = BANDWIDTH_LINE.captures(line) {
            if bundle.total_bandwidth_kbps == 0 {
                bundle.total_bandwidth_kbps = caps[1].parse().unwrap_or(0);
            }
        }

        if MEMBER_SECTION.is_match(line) {
            in_member_section = true;
            continue;
        }

        if in_member_section {
            if line.trim().starts_with('-') || line.contains("Link is") {
                continue;
            }
            if let Some(caps) = MEMBER_ROW.captures(line) {
                bundle.members.push(BundleMember {
                    interface: caps[1].to_string(),
                    device: caps[2].to_string(),
                    state: caps[3].to_string(),
                    speed_kbps: caps[4].parse().unwrap_or(0),
                });
            }
        }
    }

    if let Some(bundle) = current {
        bundles.push(bundle);
    }

    for bundle in bundles.iter_mut() {
        bundle.active_bandwidth_kbps = bundle
            .members
            .iter()
            .filter(|m| m.state.eq_ignore_ascii_case("active"))
            .map(|m| m.speed_kbps)
            .sum();
        bundle.capacity_class = bundle_capacity_class(bundle.active_bandwidth_kbps);
    }

    bundles
}
