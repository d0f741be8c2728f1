use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a directional link's cost came from, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// `show running-config router ospf` (admin intent, highest priority)
    Configured,
    /// `show ospf interface brief`
    Operational,
    /// Router LSA transit-link metric
    Lsa,
    /// No source matched; cost 1
    Default,
}

impl CostSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostSource::Configured => "configured",
            CostSource::Operational => "operational",
            CostSource::Lsa => "lsa",
            CostSource::Default => "default",
        }
    }
}

/// One router in the discovered topology. Unique on `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    pub name: String,
    /// OSPF router id (loopback address).
    pub router_id: String,
    /// First-3-letter hostname code, uppercased; `UNK` when the hostname
    /// does not follow the convention.
    pub country: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

/// One OSPF adjacency as seen from its source router. Parallel adjacencies
/// between the same pair are deliberately kept as separate links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionalLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub cost: u32,
    pub cost_source: CostSource,
    pub source_interface: String,
    /// `unknown` until bidirectional pairing fills it in.
    pub target_interface: String,
}

/// A physical link paired from the two directional adjacencies riding it,
/// keyed by `(router_a, router_b, interface_a)` with `router_a` the
/// lexicographic minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLink {
    pub id: String,
    pub router_a: String,
    pub router_b: String,
    pub cost_a_to_b: Option<u32>,
    pub cost_b_to_a: Option<u32>,
    pub interface_a: Option<String>,
    pub interface_b: Option<String>,
    pub cost_source_a: Option<CostSource>,
    pub cost_source_b: Option<CostSource>,
    pub is_asymmetric: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSourceCounts {
    pub configured: u32,
    pub operational: u32,
    pub lsa: u32,
    pub default: u32,
}

impl CostSourceCounts {
    pub fn record(&mut self, source: CostSource) {
        match source {
            CostSource::Configured => self.configured += 1,
            CostSource::Operational => self.operational += 1,
            CostSource::Lsa => self.lsa += 1,
            CostSource::Default => self.default += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyMetadata {
    pub node_count: usize,
    pub link_count: usize,
    pub physical_link_count: usize,
    pub asymmetric_link_count: usize,
    pub unique_costs: Vec<u32>,
    pub cost_sources: CostSourceCounts,
}

/// The full transformed topology for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub links: Vec<DirectionalLink>,
    pub physical_links: Vec<PhysicalLink>,
    pub timestamp: DateTime<Utc>,
    pub metadata: TopologyMetadata,
}

/// Derived capacity model for one interface. Unique on
/// `(router, interface)`; the interface name is normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceCapacity {
    pub id: String,
    pub router: String,
    pub interface: String,
    #[serde(default)]
    pub description: String,
    pub admin_status: String,
    pub line_protocol: String,
    pub bw_kbps: u64,
    pub capacity_class: String,
    pub input_rate_bps: u64,
    pub output_rate_bps: u64,
    pub input_utilization_pct: f64,
    pub output_utilization_pct: f64,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub encapsulation: String,
    pub is_physical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbor_router: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbor_interface: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One CDP adjacency. Unique on
/// `(local_router, local_interface, remote_router)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpNeighborRecord {
    pub id: String,
    pub local_router: String,
    pub local_interface: String,
    pub remote_router: String,
    #[serde(default)]
    pub remote_interface: String,
    #[serde(default)]
    pub remote_platform: String,
    #[serde(default)]
    pub remote_ip: String,
    pub updated_at: DateTime<Utc>,
}

/// Outcome summary of an interface transformation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformResults {
    pub interfaces_processed: usize,
    pub cdp_neighbors_processed: usize,
    pub devices_processed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub errors: Vec<String>,
}

/// Interface-capacity summary rows, keyed by class and by router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceSummary {
    pub total_interfaces: u32,
    pub physical_interfaces: u32,
    pub logical_interfaces: u32,
    pub by_capacity_class: HashMap<String, u32>,
    pub by_router: HashMap<String, u32>,
    pub high_utilization: Vec<HighUtilizationRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighUtilizationRow {
    pub router: String,
    pub interface: String,
    pub input_pct: f64,
    pub output_pct: f64,
    pub bw_kbps: u64,
}
