use crate::error::TransformError;
use crate::files::{latest_text_files, read_device_files, CommandClass};
use crate::interface_names::{expand_interface_name, shorten_for_id};
use crate::model::{
    CostSource, CostSourceCounts, DirectionalLink, PhysicalLink, Topology, TopologyMetadata,
    TopologyNode,
};
use chrono::Utc;
use indexmap::IndexMap;
use netops_core::execution_store::ExecutionStore;
use netops_core::parsers::ospf::{
    parse_configured_costs, parse_interface_costs, parse_network_lsas,
    parse_router_lsa_link_costs,
};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_OSPF_COST: u32 = 1;

lazy_static! {
    static ref IPV4: Regex = Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap();
    static ref ROUTER_WITH_ID: Regex =
        Regex::new(r"OSPF Router with ID \((\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\)").unwrap();
    static ref ROUTER_NUMBER_SUFFIX: Regex = Regex::new(r"-r(\d+)$").unwrap();
}

/// A FULL OSPF adjacency row from `show ospf neighbor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborRow {
    pub neighbor_id: String,
    pub state: String,
    pub interface: String,
}

/// Builds the typed network topology from the latest execution's TEXT
/// artifacts: nodes, directional OSPF links with four-tier cost resolution,
/// and bidirectionally paired physical links with asymmetric costs.
pub struct TopologyBuilder {
    text_dir: PathBuf,
}

impl TopologyBuilder {
    pub fn new(text_dir: impl Into<PathBuf>) -> Self {
        Self {
            text_dir: text_dir.into(),
        }
    }

    /// Point the builder at whatever execution `current` names.
    pub fn for_current_execution(store: &ExecutionStore) -> Result<Self, TransformError> {
        let paths = store.current_execution().ok_or_else(|| {
            TransformError::NoData("no current execution to transform".to_string())
        })?;
        info!(execution_id = %paths.execution_id, "Topology builder using current execution");
        Ok(Self::new(paths.text_dir))
    }

    /// Build the topology, optionally restricted to `valid_devices`.
    pub fn build(&self, valid_devices: Option<&[String]>) -> Result<Topology, TransformError> {
        if !self.text_dir.is_dir() {
            warn!("Text directory not found: {}", self.text_dir.display());
            return Ok(empty_topology());
        }

        let device_files =
            read_device_files(latest_text_files(&self.text_dir, valid_devices));

        // Nodes: every device that produced OSPF data
        let mut nodes: Vec<TopologyNode> = Vec::new();
        let mut sorted_devices: Vec<String> = device_files.keys().cloned().collect();
        sorted_devices.sort();
        for device_name in &sorted_devices {
            let data = &device_files[device_name];
            let has_ospf = data.keys().any(|class| {
                matches!(
                    class,
                    CommandClass::OspfNeighbor
                        | CommandClass::OspfDb
                        | CommandClass::OspfDbRouter
                        | CommandClass::OspfDbNetwork
                        | CommandClass::OspfInterface
                        | CommandClass::OspfConfig
                )
            });
            if !has_ospf {
                continue;
            }

            let router_id = data
                .get(&CommandClass::OspfDb)
                .and_then(|content| IPV4.find(content))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());

            nodes.push(TopologyNode {
                id: device_name.clone(),
                name: device_name.clone(),
                router_id,
                country: country_code(device_name),
                node_type: "router".to_string(),
            });
        }

        // Router-id <-> device mapping
        let (router_id_to_device, device_to_router_id) = build_router_id_maps(&device_files);

        // Network LSAs aggregated across every device
        let mut global_network_map: HashMap<String, Vec<String>> = HashMap::new();
        for data in device_files.values() {
            if let Some(content) = data.get(&CommandClass::OspfDbNetwork) {
                let map = parse_network_lsas(content);
                debug!("Merged {} network LSAs", map.len());
                global_network_map.extend(map);
            }
        }

        // Directional links from FULL neighbors
        let mut links: Vec<DirectionalLink> = Vec::new();
        let mut link_id_counter = 1u64;

        for device_name in &sorted_devices {
            let data = &device_files[device_name];
            let Some(neighbor_output) = data.get(&CommandClass::OspfNeighbor) else {
                continue;
            };
            let Some(source_router_id) = device_to_router_id.get(device_name) else {
                warn!(device = %device_name, "No router id found, skipping links");
                continue;
            };

            let lsa_costs = data
                .get(&CommandClass::OspfDbRouter)
                .map(|c| parse_router_lsa_link_costs(c, source_router_id))
                .unwrap_or_default();
            let interface_costs = data
                .get(&CommandClass::OspfInterface)
                .map(|c| parse_interface_costs(c))
                .unwrap_or_default();
            let configured_costs = data
                .get(&CommandClass::OspfConfig)
                .map(|c| parse_configured_costs(c))
                .unwrap_or_default();
            if !configured_costs.is_empty() {
                info!(
                    device = %device_name,
                    "Parsed {} configured OSPF costs",
                    configured_costs.len()
                );
            }

            for row in parse_neighbor_rows(neighbor_output) {
                if !row.state.contains("FULL") {
                    continue;
                }
                if is_management_interface(&row.interface) {
                    continue;
                }

                let neighbor_name = router_id_to_device
                    .get(&row.neighbor_id)
                    .cloned()
                    .unwrap_or_else(|| row.neighbor_id.clone());

                if let Some(valid) = valid_devices {
                    if !valid.contains(&neighbor_name) {
                        debug!(neighbor = %neighbor_name, "Skipping neighbor outside allowlist");
                        continue;
                    }
                }
                if &neighbor_name == device_name {
                    continue;
                }

                let (cost, cost_source) = resolve_cost(
                    &row.interface,
                    &configured_costs,
                    &interface_costs,
                    &lsa_costs,
                    &global_network_map,
                    source_router_id,
                    &row.neighbor_id,
                );

                // Parallel adjacencies stay distinct: every FULL row is its
                // own directional link
                links.push(DirectionalLink {
                    id: format!("{}-{}-{}", device_name, neighbor_name, link_id_counter),
                    source: device_name.clone(),
                    target: neighbor_name.clone(),
                    cost,
                    cost_source,
                    source_interface: row.interface.clone(),
                    target_interface: "unknown".to_string(),
                });
                link_id_counter += 1;

                info!(
                    "Created OSPF link: {}[{}] -> {} (cost={}, source={:?})",
                    device_name, row.interface, neighbor_name, cost, cost_source
                );
            }
        }

        let physical_links = pair_directional_links(&links);

        let mut cost_sources = CostSourceCounts::default();
        for link in &links {
            cost_sources.record(link.cost_source);
        }
        let mut unique_costs: Vec<u32> = links.iter().map(|l| l.cost).collect();
        unique_costs.sort_unstable();
        unique_costs.dedup();

        let asymmetric_link_count = physical_links.iter().filter(|p| p.is_asymmetric).count();
        info!(
            "Consolidated {} directional links into {} physical links ({} asymmetric)",
            links.len(),
            physical_links.len(),
            asymmetric_link_count
        );

        Ok(Topology {
            metadata: TopologyMetadata {
                node_count: nodes.len(),
                link_count: links.len(),
                physical_link_count: physical_links.len(),
                asymmetric_link_count,
                unique_costs,
                cost_sources,
            },
            nodes,
            links,
            physical_links,
            timestamp: Utc::now(),
        })
    }
}

fn empty_topology() -> Topology {
    Topology {
        nodes: Vec::new(),
        links: Vec::new(),
        physical_links: Vec::new(),
        timestamp: Utc::now(),
        metadata: TopologyMetadata::default(),
    }
}

/// First three alphabetic characters of the hostname, uppercased; `UNK`
/// otherwise.
pub fn country_code(device_name: &str) -> String {
    let prefix: String = device_name.chars().take(3).collect();
    if prefix.len() == 3 && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        prefix.to_uppercase()
    } else {
        "UNK".to_string()
    }
}

fn is_management_interface(interface: &str) -> bool {
    interface.contains("Mgmt") || interface.contains("Management") || interface.contains("Ma0")
}

/// Parse the `show ospf neighbor` table into rows.
pub fn parse_neighbor_rows(output: &str) -> Vec<NeighborRow> {
    let mut rows = Vec::new();
    let mut start_parsing = false;

    for line in output.lines() {
        if line.contains("Neighbor ID") {
            start_parsing = true;
            continue;
        }
        if !start_parsing || line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 6 {
            rows.push(NeighborRow {
                neighbor_id: parts[0].to_string(),
                state: parts[2].to_string(),
                interface: parts[5].to_string(),
            });
        }
    }

    rows
}

/// Router-id ↔ device maps from `OSPF Router with ID (...)` headers, with a
/// `-r<n>` → `172.16.n.n` fallback for devices whose outputs lack one.
fn build_router_id_maps(
    device_files: &HashMap<String, HashMap<CommandClass, String>>,
) -> (HashMap<String, String>, HashMap<String, String>) {
    let mut router_id_to_device = HashMap::new();
    let mut device_to_router_id = HashMap::new();

    for (device_name, data) in device_files {
        let router_id = [
            CommandClass::OspfDb,
            CommandClass::OspfDbRouter,
            CommandClass::OspfNeighbor,
        ]
        .iter()
        .find_map(|class| {
            data.get(class)
                .and_then(|content| ROUTER_WITH_ID.captures(content))
                .map(|caps| caps[1].to_string())
        });

        if let Some(router_id) = router_id {
            debug!("Mapped router id {} <-> {}", router_id, device_name);
            router_id_to_device.insert(router_id.clone(), device_name.clone());
            device_to_router_id.insert(device_name.clone(), router_id);
        }
    }

    for device_name in device_files.keys() {
        if device_to_router_id.contains_key(device_name) {
            continue;
        }
        if let Some(caps) = ROUTER_NUMBER_SUFFIX.captures(device_name) {
            let n = &caps[1];
            let inferred = format!("172.16.{}.{}", n, n);
            info!("Inferred router id {} <-> {}", inferred, device_name);
            router_id_to_device.insert(inferred.clone(), device_name.clone());
            device_to_router_id.insert(device_name.clone(), inferred);
        }
    }

    (router_id_to_device, device_to_router_id)
}

/// Four-tier cost resolution for one adjacency:
/// configured > operational > LSA > default. A pure function of its inputs.
pub fn resolve_cost(
    interface: &str,
    configured_costs: &HashMap<String, u32>,
    interface_costs: &HashMap<String, u32>,
    lsa_costs: &HashMap<String, u32>,
    network_map: &HashMap<String, Vec<String>>,
    source_router_id: &str,
    neighbor_router_id: &str,
) -> (u32, CostSource) {
    let expanded = expand_interface_name(interface);

    if let Some(cost) = configured_costs.get(&expanded) {
        return (*cost, CostSource::Configured);
    }

    if let Some(cost) = interface_costs
        .get(interface)
        .or_else(|| interface_costs.get(&expanded))
    {
        return (*cost, CostSource::Operational);
    }

    for (link_id, cost) in lsa_costs {
        if let Some(attached) = network_map.get(link_id) {
            if attached.iter().any(|r| r == source_router_id)
                && attached.iter().any(|r| r == neighbor_router_id)
            {
                return (*cost, CostSource::Lsa);
            }
        }
    }

    (DEFAULT_OSPF_COST, CostSource::Default)
}

/// Pair directional links into physical links.
///
/// Pass 1 seeds a record per `(a, b, interface_a)` from every link whose
/// source is the lexicographically smaller router. Pass 2 matches reverse
/// links onto them, preferring the record whose `interface_a` equals the
/// reverse link's interface (same-name interfaces on both ends are the
/// common case), otherwise any record still missing its B side. Unmatched
/// reverse links become orphan records.
pub fn pair_directional_links(links: &[DirectionalLink]) -> Vec<PhysicalLink> {
    let mut physical: IndexMap<(String, String, String), PhysicalLink> = IndexMap::new();

    for link in links {
        let (a, b) = ordered_pair(&link.source, &link.target);
        if link.source != a {
            continue;
        }
        let key = (a.clone(), b.clone(), link.source_interface.clone());
        physical.entry(key).or_insert_with(|| PhysicalLink {
            id: String::new(),
            router_a: a,
            router_b: b,
            cost_a_to_b: Some(link.cost),
            cost_b_to_a: None,
            interface_a: Some(link.source_interface.clone()),
            interface_b: None,
            cost_source_a: Some(link.cost_source),
            cost_source_b: None,
            is_asymmetric: false,
        });
    }

    for link in links {
        let (a, b) = ordered_pair(&link.source, &link.target);
        if link.source != b {
            continue;
        }
        let interface_b = &link.source_interface;

        let mut matched_key: Option<(String, String, String)> = None;
        for (key, plink) in physical.iter() {
            if key.0 != a || key.1 != b {
                continue;
            }
            if plink.interface_b.is_none() {
                if plink.interface_a.as_deref() == Some(interface_b.as_str()) {
                    matched_key = Some(key.clone());
                    break;
                }
                matched_key = Some(key.clone());
            }
        }

        match matched_key {
            Some(key) => {
                if let Some(plink) = physical.get_mut(&key) {
                    plink.cost_b_to_a = Some(link.cost);
                    plink.interface_b = Some(interface_b.clone());
                    plink.cost_source_b = Some(link.cost_source);
                }
            }
            None => {
                let key = (a.clone(), b.clone(), format!("B2A-{}", interface_b));
                physical.insert(
                    key,
                    PhysicalLink {
                        id: String::new(),
                        router_a: a,
                        router_b: b,
                        cost_a_to_b: None,
                        cost_b_to_a: Some(link.cost),
                        interface_a: None,
                        interface_b: Some(interface_b.clone()),
                        cost_source_a: None,
                        cost_source_b: Some(link.cost_source),
                        is_asymmetric: false,
                    },
                );
            }
        }
    }

    physical
        .into_values()
        .map(|mut plink| {
            plink.is_asymmetric = match (plink.cost_a_to_b, plink.cost_b_to_a) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            };
            let suffix = plink
                .interface_a
                .as_deref()
                .map(|i| format!("-{}", shorten_for_id(i)))
                .unwrap_or_default();
            plink.id = format!("{}-{}{}", plink.router_a, plink.router_b, suffix);
            plink
        })
        .collect()
}

fn ordered_pair(x: &str, y: &str) -> (String, String) {
    if x <= y {
        (x.to_string(), y.to_string())
    } else {
        (y.to_string(), x.to_string())
    }
}

/// Export the topology next to the other transformation outputs.
pub fn write_topology_json(topology: &Topology, output_dir: &Path) -> Result<PathBuf, TransformError> {
    std::fs::create_dir_all(output_dir)?;
    let file_name = format!("network_topology_{}.json", Utc::now().format("%Y-%m-%d"));
    let path = output_dir.join(file_name);
    std::fs::write(&path, serde_json::to_vec_pretty(topology)?)?;
    info!("Topology written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directional(
        id: u64,
        source: &str,
        target: &str,
        cost: u32,
        cost_source: CostSource,
        interface: &str,
    ) -> DirectionalLink {
        DirectionalLink {
            id: format!("{}-{}-{}", source, target, id),
            source: source.to_string(),
            target: target.to_string(),
            cost,
            cost_source,
            source_interface: interface.to_string(),
            target_interface: "unknown".to_string(),
        }
    }

    #[test]
    fn neighbor_rows_parse_full_adjacencies() {
        let output = "\
Neighbor ID     Pri   State           Dead Time   Address         Interface
172.16.1.1      1     FULL/DR         00:00:35    172.13.0.1      GigabitEthernet0/0/0/0
172.16.2.2      1     FULL/BDR        00:00:38    172.13.0.2      GigabitEthernet0/0/0/1
172.16.3.3      1     INIT            00:00:31    172.13.0.3      GigabitEthernet0/0/0/2
";
        let rows = parse_neighbor_rows(output);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].neighbor_id, "172.16.1.1");
        assert_eq!(rows[0].state, "FULL/DR");
        assert_eq!(rows[1].interface, "GigabitEthernet0/0/0/1");
    }

    #[test]
    fn country_codes_follow_hostname_prefix() {
        assert_eq!(country_code("zwe-r1"), "ZWE");
        assert_eq!(country_code("usarouter1"), "USA");
        assert_eq!(country_code("r1"), "UNK");
        assert_eq!(country_code("1ab-r1"), "UNK");
    }

    #[test]
    fn cost_resolution_respects_priority() {
        let mut configured = HashMap::new();
        configured.insert("GigabitEthernet0/0/0/1".to_string(), 200);
        let mut operational = HashMap::new();
        operational.insert("Gi0/0/0/1".to_string(), 600);
        let mut lsa = HashMap::new();
        lsa.insert("172.13.0.10".to_string(), 100);
        let mut network_map = HashMap::new();
        network_map.insert(
            "172.13.0.10".to_string(),
            vec!["172.16.1.1".to_string(), "172.16.2.2".to_string()],
        );

        // Configured wins, matched through the expanded interface name
        assert_eq!(
            resolve_cost(
                "Gi0/0/0/1",
                &configured,
                &operational,
                &lsa,
                &network_map,
                "172.16.1.1",
                "172.16.2.2"
            ),
            (200, CostSource::Configured)
        );

        // Without configured, operational wins
        assert_eq!(
            resolve_cost(
                "Gi0/0/0/1",
                &HashMap::new(),
                &operational,
                &lsa,
                &network_map,
                "172.16.1.1",
                "172.16.2.2"
            ),
            (600, CostSource::Operational)
        );

        // Without either, the LSA metric applies when both routers attach
        assert_eq!(
            resolve_cost(
                "Gi0/0/0/1",
                &HashMap::new(),
                &HashMap::new(),
                &lsa,
                &network_map,
                "172.16.1.1",
                "172.16.2.2"
            ),
            (100, CostSource::Lsa)
        );

        // LSA does not apply when the neighbor is not attached
        assert_eq!(
            resolve_cost(
                "Gi0/0/0/1",
                &HashMap::new(),
                &HashMap::new(),
                &lsa,
                &network_map,
                "172.16.1.1",
                "172.16.9.9"
            ),
            (1, CostSource::Default)
        );
    }

    #[test]
    fn symmetric_pairing_produces_one_physical_link() {
        // Two directional links, same interface name on both ends, equal
        // LSA costs
        let links = vec![
            directional(1, "A", "B", 100, CostSource::Lsa, "Gi0/0/0/1"),
            directional(2, "B", "A", 100, CostSource::Lsa, "Gi0/0/0/1"),
        ];
        let physical = pair_directional_links(&links);
        assert_eq!(physical.len(), 1);

        let link = &physical[0];
        assert_eq!(link.router_a, "A");
        assert_eq!(link.router_b, "B");
        assert_eq!(link.cost_a_to_b, Some(100));
        assert_eq!(link.cost_b_to_a, Some(100));
        assert_eq!(link.interface_a.as_deref(), Some("Gi0/0/0/1"));
        assert_eq!(link.interface_b.as_deref(), Some("Gi0/0/0/1"));
        assert!(!link.is_asymmetric);
        assert_eq!(link.cost_source_a, Some(CostSource::Lsa));
        assert_eq!(link.cost_source_b, Some(CostSource::Lsa));
    }

    #[test]
    fn asymmetric_configured_costs_are_flagged() {
        let links = vec![
            directional(1, "A", "B", 200, CostSource::Configured, "Gi0/0/0/1"),
            directional(2, "B", "A", 500, CostSource::Configured, "Gi0/0/0/1"),
        ];
        let physical = pair_directional_links(&links);
        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].cost_a_to_b, Some(200));
        assert_eq!(physical[0].cost_b_to_a, Some(500));
        assert!(physical[0].is_asymmetric);
        assert_eq!(physical[0].cost_source_a, Some(CostSource::Configured));
        assert_eq!(physical[0].cost_source_b, Some(CostSource::Configured));
    }

    #[test]
    fn parallel_adjacencies_stay_distinct() {
        // A and B share two adjacencies on different interfaces
        let links = vec![
            directional(1, "A", "B", 10, CostSource::Lsa, "Gi0/0/0/1"),
            directional(2, "A", "B", 20, CostSource::Lsa, "Gi0/0/0/2"),
            directional(3, "B", "A", 10, CostSource::Lsa, "Gi0/0/0/1"),
            directional(4, "B", "A", 20, CostSource::Lsa, "Gi0/0/0/2"),
        ];
        let physical = pair_directional_links(&links);
        assert_eq!(physical.len(), 2);

        let interfaces: Vec<_> = physical
            .iter()
            .map(|p| p.interface_a.clone().unwrap())
            .collect();
        assert!(interfaces.contains(&"Gi0/0/0/1".to_string()));
        assert!(interfaces.contains(&"Gi0/0/0/2".to_string()));
        assert!(physical.iter().all(|p| !p.is_asymmetric));
        // Interface-keyed ids keep the two links distinct
        assert_ne!(physical[0].id, physical[1].id);
    }

    #[test]
    fn orphan_reverse_link_creates_its_own_record() {
        let links = vec![directional(1, "B", "A", 42, CostSource::Default, "Gi0/0/0/9")];
        let physical = pair_directional_links(&links);
        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].cost_a_to_b, None);
        assert_eq!(physical[0].cost_b_to_a, Some(42));
        assert_eq!(physical[0].interface_a, None);
        assert_eq!(physical[0].interface_b.as_deref(), Some("Gi0/0/0/9"));
        assert!(!physical[0].is_asymmetric);
    }

    #[test]
    fn mismatched_interface_names_still_pair_when_only_candidate() {
        let links = vec![
            directional(1, "A", "B", 10, CostSource::Lsa, "Gi0/0/0/1"),
            directional(2, "B", "A", 30, CostSource::Lsa, "Te0/0/0/7"),
        ];
        let physical = pair_directional_links(&links);
        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].interface_a.as_deref(), Some("Gi0/0/0/1"));
        assert_eq!(physical[0].interface_b.as_deref(), Some("Te0/0/0/7"));
        assert!(physical[0].is_asymmetric);
    }
}
