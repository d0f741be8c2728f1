//! Topology and interface transformation over netops execution artifacts.
//!
//! Reads the latest execution (via the `current` pointer), turns device
//! text output into a typed topology - nodes, directional OSPF links with
//! four-tier cost resolution, bidirectionally paired physical links - and
//! derives the interface-capacity model with CDP correlation. Records are
//! upserted into SQLite by their uniqueness keys.

pub mod builder;
pub mod error;
pub mod files;
pub mod interface_names;
pub mod interfaces;
pub mod model;
pub mod store;

#[macro_use]
extern crate lazy_static;

pub use builder::{
    pair_directional_links, parse_neighbor_rows, resolve_cost, write_topology_json,
    TopologyBuilder,
};
pub use error::TransformError;
pub use interface_names::{
    capacity_from_interface_type, clean_interface_name, expand_interface_name,
    is_physical_interface, normalize_interface_name, parent_interface,
};
pub use interfaces::InterfaceTransformer;
pub use model::{
    CdpNeighborRecord, CostSource, DirectionalLink, InterfaceCapacity, InterfaceSummary,
    PhysicalLink, Topology, TopologyMetadata, TopologyNode, TransformResults,
};
pub use store::TopologyStore;

use netops_core::execution_store::ExecutionStore;
use tracing::info;

/// Transform the execution named by the `current` pointer end to end:
/// build and persist the topology, then the interface-capacity and CDP
/// records.
pub async fn transform_current_execution(
    executions: &ExecutionStore,
    db: &TopologyStore,
    valid_devices: Option<&[String]>,
) -> Result<(Topology, TransformResults), TransformError> {
    let topology = TopologyBuilder::for_current_execution(executions)?.build(valid_devices)?;
    db.save_topology(&topology).await?;

    let mut transformer = InterfaceTransformer::for_current_execution(executions)?;
    let (interfaces, cdp_neighbors, results) = transformer.transform(valid_devices);
    db.save_interfaces(&interfaces).await?;
    db.save_cdp_neighbors(&cdp_neighbors).await?;

    info!(
        nodes = topology.nodes.len(),
        links = topology.links.len(),
        interfaces = results.interfaces_processed,
        "Transformation complete"
    );
    Ok((topology, results))
}
