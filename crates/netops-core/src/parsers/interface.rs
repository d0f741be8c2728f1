use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref BRIEF_ROW: Regex = Regex::new(
        r"^\s*((?:Gi|Te|Hu|Fo|Tf|Be|BE|Lo|Mg|Nu|Fa)\S*)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\d+)\s+(\d+)"
    )
    .unwrap();
    static ref DESCRIPTION_ROW: Regex =
        Regex::new(r"(?i)^(\S+)\s+(up|down|admin-down)\s+(up|down|admin-down)\s*(.*)").unwrap();
    static ref INTERFACE_HEADER: Regex =
        Regex::new(r"^(\S+) is ([\w-]+), line protocol is ([\w-]+)").unwrap();
    static ref BW_LINE: Regex = Regex::new(r"BW\s+(\d+)\s+Kbit").unwrap();
    static ref INPUT_RATE: Regex =
        Regex::new(r"input rate\s+(\d+)\s+bits/sec,\s+(\d+)\s+packets/sec").unwrap();
    static ref OUTPUT_RATE: Regex =
        Regex::new(r"output rate\s+(\d+)\s+bits/sec,\s+(\d+)\s+packets/sec").unwrap();
    static ref MAC_ADDRESS: Regex = Regex::new(r"address is\s+([0-9a-fA-F.]+)").unwrap();
    static ref DESCRIPTION_LINE: Regex = Regex::new(r"Description:\s+(.+)").unwrap();
}

/// One row of `show interface brief` / `show ipv4 interface brief`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceBrief {
    pub interface: String,
    pub state: String,
    pub line_protocol: String,
    pub encap: String,
    pub mtu: u32,
    pub bw_kbps: u64,
    pub capacity_class: String,
}

/// One row of `show interface description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescription {
    pub interface: String,
    pub status: String,
    pub protocol: String,
    pub description: String,
}

/// One interface block from full `show interface` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDetail {
    pub interface: String,
    pub admin_status: String,
    pub line_protocol: String,
    pub bw_kbps: u64,
    pub input_rate_bps: u64,
    pub output_rate_bps: u64,
    pub input_rate_pps: u64,
    pub output_rate_pps: u64,
    pub input_utilization_pct: f64,
    pub output_utilization_pct: f64,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub description: String,
    pub capacity_class: String,
}

/// Capacity class bucket from a raw bandwidth value.
pub fn capacity_class_from_bandwidth(bw_kbps: u64) -> String {
    if bw_kbps >= 100_000_000 {
        "100G".to_string()
    } else if bw_kbps >= 40_000_000 {
        "40G".to_string()
    } else if bw_kbps >= 10_000_000 {
        "10G".to_string()
    } else if bw_kbps >= 1_000_000 {
        "1G".to_string()
    } else if bw_kbps >= 100_000 {
        "100M".to_string()
    } else if bw_kbps > 0 {
        format!("{}K", bw_kbps)
    } else {
        "Unknown".to_string()
    }
}

pub fn parse_interface_brief(output: &str) -> Vec<InterfaceBrief> {
    let mut interfaces = Vec::new();

    for line in output.lines() {
        if let Some(caps) = BRIEF_ROW.captures(line) {
            let (Ok(mtu), Ok(bw_kbps)) = (caps[5].parse(), caps[6].parse::<u64>()) else {
                continue;
            };
            interfaces.push(InterfaceBrief {
                interface: caps[1].to_string(),
                state: caps[2].to_string(),
                line_protocol: caps[3].to_string(),
                encap: caps[4].to_string(),
                mtu,
                bw_kbps,
                capacity_class: capacity_class_from_bandwidth(bw_kbps),
            });
        }
    }

    interfaces
}

pub fn parse_interface_descriptions(output: &str) -> Vec<InterfaceDescription> {
    let mut interfaces = Vec::new();

    for line in output.lines() {
        if let Some(caps) = DESCRIPTION_ROW.captures(line) {
            // Skip the header row itself
            if caps[1].eq_ignore_ascii_case("interface") {
                continue;
            }
            interfaces.push(InterfaceDescription {
                interface: caps[1].to_string(),
                status: caps[2].to_string(),
                protocol: caps[3].to_string(),
                description: caps[4].trim().to_string(),
            });
        }
    }

    interfaces
}

/// Parse full `show interface` output into per-interface details with
/// traffic rates and utilization.
pub fn parse_interfaces_full(output: &str) -> Vec<InterfaceDetail> {
    let mut interfaces: Vec<InterfaceDetail> = Vec::new();
    let mut current: Option<InterfaceDetail> = None;

    for line in output.lines() {
        if let Some(caps) = INTERFACE_HEADER.captures(line) {
            if let Some(detail) = current.take() {
                interfaces.push(detail);
            }
            current = Some(InterfaceDetail {
                interface: caps[1].to_string(),
                admin_status: caps[2].to_string(),
                line_protocol: caps[3].to_string(),
                bw_kbps: 0,
                input_rate_bps: 0,
                output_rate_bps: 0,
                input_rate_pps: 0,
                output_rate_pps: 0,
                input_utilization_pct: 0.0,
                output_utilization_pct: 0.0,
                mac_address: String::new(),
                description: String::new(),
                capacity_class: "Unknown".to_string(),
            });
            continue;
        }

        let Some(detail) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = BW_LINE.captures(line) {
            if let Ok(bw) = caps[1].parse::<u64>() {
                detail.bw_kbps = bw;
                detail.capacity_class = capacity_class_from_bandwidth(bw);
            }
        }
        if let Some(caps) = INPUT_RATE.captures(line) {
            detail.input_rate_bps = caps[1].parse().unwrap_or(0);
            detail.input_rate_pps = caps[2].parse().unwrap_or(0);
        }
        if let Some(caps) = OUTPUT_RATE.captures(line) {
            detail.output_rate_bps = caps[1].parse().unwrap_or(0);
            detail.output_rate_pps = caps[2].parse().unwrap_or(0);
        }
        if let Some(caps) = MAC_ADDRESS.captures(line) {
            detail.mac_address = caps[1].to_string();
        }
        if let Some(caps) = DESCRIPTION_LINE.captures(line) {
            detail.description = caps[1].trim().to_string();
        }
    }

    if let Some(detail) = current {
        interfaces.push(detail);
    }

    for detail in interfaces.iter_mut() {
        let (input, output) =
            utilization_pct(detail.bw_kbps, detail.input_rate_bps, detail.output_rate_bps);
        detail.input_utilization_pct = input;
        detail.output_utilization_pct = output;
    }

    interfaces
}

/// Utilization as a percentage of nominal bandwidth, rounded to two
/// decimals. Zero bandwidth yields zero utilization.
fn utilization_pct(bw_kbps: u64, input_bps: u64, output_bps: u64) -> (f64, f64) {
    if bw_kbps == 0 {
        return (0.0, 0.0);
    }
    let bw_bps = (bw_kbps * 1000) as f64;
    let round2 = |v: f64| (v * 100.0).round() / 100.0;
    (
        round2(input_bps as f64 / bw_bps * 100.0),
        round2(output_bps as f64 / bw_bps * 100.0),
    )
}
