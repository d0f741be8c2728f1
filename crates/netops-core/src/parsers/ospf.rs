use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

lazy_static! {
    static ref LSA_ROW: Regex = Regex::new(
        r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\s+(\d+)\s+(0x[0-9a-fA-F]+)\s+(0x[0-9a-fA-F]+)\s+(\d+)"
    )
    .unwrap();
    static ref LINK_STATE_ID: Regex =
        Regex::new(r"Link State ID:\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap();
    static ref ADVERTISING_ROUTER: Regex =
        Regex::new(r"Advertising Router:\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap();
    static ref TRANSIT_LINK_ID: Regex = Regex::new(
        r"\(Link ID\)\s+Designated Router address:\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})"
    )
    .unwrap();
    static ref TOS_METRIC: Regex = Regex::new(r"TOS 0 [Mm]etrics?:\s+(\d+)").unwrap();
    static ref ATTACHED_ROUTER: Regex =
        Regex::new(r"Attached Router:\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap();
    static ref INTERFACE_COST_ROW: Regex =
        Regex::new(r"^(\S+)\s+(\d+)\s+(\S+)\s+(\d+\.\d+\.\d+\.\d+/\d+)\s+(\d+)\s+(\S+)").unwrap();
    static ref CONFIG_COST: Regex = Regex::new(r"cost\s+(\d+)").unwrap();
}

/// One row of the LSA summary table
/// (`Link ID / ADV Router / Age / Seq# / Checksum / Link count`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsaSummary {
    pub link_id: String,
    pub adv_router: String,
    pub age: u32,
    pub seq: String,
    pub checksum: String,
    pub link_count: u32,
}

/// A Transit Network link inside a Router LSA: the designated router address
/// identifying the segment plus the advertised TOS 0 metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitLink {
    pub adv_router: String,
    pub link_id: String,
    pub metric: u32,
}

/// Parsed `show ospf database router` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterLsaDatabase {
    pub lsas: Vec<LsaSummary>,
    pub transit_links: Vec<TransitLink>,
}

/// One row of `show ospf interface brief`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfInterface {
    pub interface: String,
    pub area: String,
    pub ip_mask: String,
    pub cost: u32,
    pub state: String,
}

/// LSA summary rows from any `show ospf database` variant.
pub fn parse_lsa_table(output: &str) -> Vec<LsaSummary> {
    LSA_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            Some(LsaSummary {
                link_id: caps[1].to_string(),
                adv_router: caps[2].to_string(),
                age: caps[3].parse().ok()?,
                seq: caps[4].to_string(),
                checksum: caps[5].to_string(),
                link_count: caps[6].parse().ok()?,
            })
        })
        .collect()
}

/// Full parse of `show ospf database router`: the LSA table plus every
/// Transit Network link with its metric, tagged with the advertising router.
pub fn parse_ospf_database_router(output: &str) -> RouterLsaDatabase {
    let mut db = RouterLsaDatabase {
        lsas: parse_lsa_table(output),
        transit_links: Vec::new(),
    };

    let lines: Vec<&str> = output.lines().collect();
    let mut current_router: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = LINK_STATE_ID.captures(line) {
            current_router = Some(caps[1].to_string());
            i += 1;
            continue;
        }
        // "Advertising Router" is the more reliable scope marker
        if let Some(caps) = ADVERTISING_ROUTER.captures(line) {
            current_router = Some(caps[1].to_string());
            i += 1;
            continue;
        }

        if line.contains("Link connected to: a Transit Network")
            || line.contains("Links connected to: a Transit Network")
        {
            let mut link_id = None;
            let mut metric = None;
            let mut j = i + 1;

            // Link ID and metric live within the next few lines of the block
            while j < lines.len().min(i + 10) {
                if let Some(caps) = TRANSIT_LINK_ID.captures(lines[j]) {
                    link_id = Some(caps[1].to_string());
                }
                if let Some(caps) = TOS_METRIC.captures(lines[j]) {
                    metric = caps[1].parse().ok();
                    break;
                }
                j += 1;
            }

            if let (Some(link_id), Some(metric), Some(router)) =
                (link_id, metric, current_router.as_ref())
            {
                db.transit_links.push(TransitLink {
                    adv_router: router.clone(),
                    link_id,
                    metric,
                });
            }
            i = j;
        } else {
            i += 1;
        }
    }

    db
}

/// Transit-link costs advertised by one router: `link_id (DR address) → cost`.
pub fn parse_router_lsa_link_costs(output: &str, source_router_id: &str) -> HashMap<String, u32> {
    parse_ospf_database_router(output)
        .transit_links
        .into_iter()
        .filter(|link| link.adv_router == source_router_id)
        .map(|link| (link.link_id, link.metric))
        .collect()
}

/// Network LSAs: `DR address → attached router ids`.
pub fn parse_network_lsas(output: &str) -> HashMap<String, Vec<String>> {
    let mut network_map: HashMap<String, Vec<String>> = HashMap::new();
    let mut current_link_id: Option<String> = None;

    for line in output.lines() {
        if let Some(caps) = LINK_STATE_ID.captures(line) {
            let link_id = caps[1].to_string();
            network_map.entry(link_id.clone()).or_default();
            current_link_id = Some(link_id);
            continue;
        }

        if let (Some(link_id), Some(caps)) = (current_link_id.as_ref(), ATTACHED_ROUTER.captures(line)) {
            network_map
                .entry(link_id.clone())
                .or_default()
                .push(caps[1].to_string());
        }
    }

    network_map
}

/// Rows of `show ospf interface brief`. Also usable as a fallback interface
/// inventory when full `show interface` output is missing.
pub fn parse_ospf_interface_brief(output: &str) -> Vec<OspfInterface> {
    let mut interfaces = Vec::new();
    let mut start_parsing = false;

    for line in output.lines() {
        if line.contains("Interface") && line.contains("Cost") {
            start_parsing = true;
            continue;
        }
        if !start_parsing || line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = INTERFACE_COST_ROW.captures(line.trim()) {
            if let Ok(cost) = caps[5].parse() {
                interfaces.push(OspfInterface {
                    interface: caps[1].to_string(),
                    area: caps[3].to_string(),
                    ip_mask: caps[4].to_string(),
                    cost,
                    state: caps[6].to_string(),
                });
            }
        }
    }

    interfaces
}

/// Operational per-interface costs: `interface → cost`.
pub fn parse_interface_costs(output: &str) -> HashMap<String, u32> {
    parse_ospf_interface_brief(output)
        .into_iter()
        .map(|row| (row.interface, row.cost))
        .collect()
}

/// Explicitly configured costs from `show running-config router ospf`,
/// scoped to `area` blocks: `interface → cost`.
pub fn parse_configured_costs(output: &str) -> HashMap<String, u32> {
    let mut configured = HashMap::new();
    let mut current_interface: Option<String> = None;
    let mut in_area = false;

    for line in output.lines() {
        let stripped = line.trim();

        if stripped.starts_with("area ") {
            in_area = true;
            continue;
        }

        if in_area && stripped.starts_with("interface ") {
            current_interface = Some(stripped.trim_start_matches("interface ").trim().to_string());
            continue;
        }

        if let Some(interface) = current_interface.as_ref() {
            if stripped.contains("cost ") {
                if let Some(caps) = CONFIG_COST.captures(stripped) {
                    if let Ok(cost) = caps[1].parse() {
                        configured.insert(interface.clone(), cost);
                    }
                }
            }
        }

        // '!' terminates the interface block
        if stripped == "!" {
            current_interface = None;
        }
    }

    configured
}
