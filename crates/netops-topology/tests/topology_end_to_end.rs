//! Topology construction from realistic execution artifacts.

use netops_core::execution_store::ExecutionStore;
use netops_topology::{CostSource, TopologyBuilder};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn init_test_logging() {
    // First caller installs the subscriber, the rest are told no
    let _ = netops_core::init_logging("warn", None);
}

fn write_text(dir: &Path, device: &str, command_slug: &str, ts: &str, content: &str) {
    let name = format!("{}_{}_{}.txt", device, command_slug, ts);
    fs::write(dir.join(name), content).unwrap();
}

fn neighbor_output(router_id: &str, neighbor_id: &str, address: &str, interface: &str) -> String {
    format!(
        "\
            OSPF Router with ID ({router_id}) (Process ID 1)

Neighbors for OSPF 1

Neighbor ID     Pri   State           Dead Time   Address         Interface
{neighbor_id}      1     FULL/DR         00:00:35    {address}      {interface}
"
    )
}

fn router_lsa_output(router_id: &str, dr_address: &str, metric: u32) -> String {
    format!(
        "\
            OSPF Router with ID ({router_id}) (Process ID 1)

                Router Link States (Area 0)

  Link State ID: {router_id}
  Advertising Router: {router_id}
   Number of Links: 1

    Links connected to: a Transit Network
     (Link ID) Designated Router address: {dr_address}
     (Link Data) Router Interface address: {dr_address}
      TOS 0 metric: {metric}
"
    )
}

fn network_lsa_output(dr_address: &str, attached: &[&str]) -> String {
    let mut out = format!(
        "\
                Net Link States (Area 0)

  Link State ID: {} (address of Designated Router)
  Advertising Router: {}
",
        dr_address, attached[0]
    );
    for router in attached {
        out.push_str(&format!("     Attached Router: {}\n", router));
    }
    out
}

fn ospf_db_output(router_id: &str) -> String {
    format!(
        "\
            OSPF Router with ID ({router_id}) (Process ID 1)

Link ID         ADV Router      Age         Seq#       Checksum Link count
{router_id}      {router_id}      100         0x80000001 0x004f   2
"
    )
}

const TS: &str = "2025-03-14_10-00-00";

/// Symmetric two-node run: one FULL adjacency on the same interface at both
/// ends, LSA TOS-0 metric 100 on both sides.
#[test]
fn symmetric_two_node_run() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    // Device A: router id 172.16.1.1, device B: 172.16.2.2, shared segment
    // DR 172.13.0.10
    write_text(text, "aaa-r1", "show_ospf_database", TS, &ospf_db_output("172.16.1.1"));
    write_text(text, "bbb-r2", "show_ospf_database", TS, &ospf_db_output("172.16.2.2"));
    write_text(
        text,
        "aaa-r1",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.1.1", "172.16.2.2", "172.13.0.10", "Gi0/0/0/1"),
    );
    write_text(
        text,
        "bbb-r2",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.2.2", "172.16.1.1", "172.13.0.9", "Gi0/0/0/1"),
    );
    write_text(
        text,
        "aaa-r1",
        "show_ospf_database_router",
        TS,
        &router_lsa_output("172.16.1.1", "172.13.0.10", 100),
    );
    write_text(
        text,
        "bbb-r2",
        "show_ospf_database_router",
        TS,
        &router_lsa_output("172.16.2.2", "172.13.0.10", 100),
    );
    write_text(
        text,
        "aaa-r1",
        "show_ospf_database_network",
        TS,
        &network_lsa_output("172.13.0.10", &["172.16.1.1", "172.16.2.2"]),
    );

    let topology = TopologyBuilder::new(text).build(None).unwrap();

    // Two nodes with countries from the hostname prefix
    assert_eq!(topology.nodes.len(), 2);
    let node_a = topology.nodes.iter().find(|n| n.name == "aaa-r1").unwrap();
    assert_eq!(node_a.country, "AAA");
    assert_eq!(node_a.router_id, "172.16.1.1");
    let node_b = topology.nodes.iter().find(|n| n.name == "bbb-r2").unwrap();
    assert_eq!(node_b.country, "BBB");

    // Two directional links, both with LSA-derived cost 100
    assert_eq!(topology.links.len(), 2);
    assert!(topology
        .links
        .iter()
        .all(|l| l.cost == 100 && l.cost_source == CostSource::Lsa));

    // One symmetric physical link
    assert_eq!(topology.physical_links.len(), 1);
    let plink = &topology.physical_links[0];
    assert_eq!(plink.router_a, "aaa-r1");
    assert_eq!(plink.router_b, "bbb-r2");
    assert_eq!(plink.cost_a_to_b, Some(100));
    assert_eq!(plink.cost_b_to_a, Some(100));
    assert_eq!(plink.interface_a.as_deref(), Some("Gi0/0/0/1"));
    assert_eq!(plink.interface_b.as_deref(), Some("Gi0/0/0/1"));
    assert!(!plink.is_asymmetric);
    assert_eq!(plink.cost_source_a, Some(CostSource::Lsa));
    assert_eq!(plink.cost_source_b, Some(CostSource::Lsa));

    assert_eq!(topology.metadata.asymmetric_link_count, 0);
    assert_eq!(topology.metadata.unique_costs, vec![100]);
    assert_eq!(topology.metadata.cost_sources.lsa, 2);
}

/// Asymmetric configured costs: `cost 200` at A, `cost 500` at B, matched
/// through interface-name expansion against the running-config.
#[test]
fn asymmetric_configured_cost() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    write_text(
        text,
        "aaa-r1",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.1.1", "172.16.2.2", "172.13.0.10", "Gi0/0/0/1"),
    );
    write_text(
        text,
        "bbb-r2",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.2.2", "172.16.1.1", "172.13.0.9", "Gi0/0/0/1"),
    );
    write_text(
        text,
        "aaa-r1",
        "show_running-config_router_ospf",
        TS,
        "\
router ospf 1
 area 0
  interface GigabitEthernet0/0/0/1
   cost 200
  !
 !
!
",
    );
    write_text(
        text,
        "bbb-r2",
        "show_running-config_router_ospf",
        TS,
        "\
router ospf 1
 area 0
  interface GigabitEthernet0/0/0/1
   cost 500
  !
 !
!
",
    );

    let topology = TopologyBuilder::new(text).build(None).unwrap();

    assert_eq!(topology.physical_links.len(), 1);
    let plink = &topology.physical_links[0];
    assert_eq!(plink.cost_a_to_b, Some(200));
    assert_eq!(plink.cost_b_to_a, Some(500));
    assert!(plink.is_asymmetric);
    assert_eq!(plink.cost_source_a, Some(CostSource::Configured));
    assert_eq!(plink.cost_source_b, Some(CostSource::Configured));
    assert_eq!(topology.metadata.asymmetric_link_count, 1);
    assert_eq!(topology.metadata.cost_sources.configured, 2);
}

/// Parallel adjacencies: two FULL adjacencies between the same pair on
/// different interfaces produce four directional links and two physical
/// links with distinct `interface_a`.
#[test]
fn parallel_adjacencies_are_not_deduplicated() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    let neighbors_a = "\
            OSPF Router with ID (172.16.1.1) (Process ID 1)

Neighbor ID     Pri   State           Dead Time   Address         Interface
172.16.2.2      1     FULL/DR         00:00:35    172.13.0.10     Gi0/0/0/1
172.16.2.2      1     FULL/BDR        00:00:38    172.13.0.14     Gi0/0/0/2
";
    let neighbors_b = "\
            OSPF Router with ID (172.16.2.2) (Process ID 1)

Neighbor ID     Pri   State           Dead Time   Address         Interface
172.16.1.1      1     FULL/BDR        00:00:35    172.13.0.9      Gi0/0/0/1
172.16.1.1      1     FULL/DR         00:00:38    172.13.0.13     Gi0/0/0/2
";
    write_text(text, "aaa-r1", "show_ospf_neighbor", TS, neighbors_a);
    write_text(text, "bbb-r2", "show_ospf_neighbor", TS, neighbors_b);

    let topology = TopologyBuilder::new(text).build(None).unwrap();

    assert_eq!(topology.links.len(), 4);
    assert_eq!(topology.physical_links.len(), 2);

    let mut interfaces: Vec<String> = topology
        .physical_links
        .iter()
        .map(|p| p.interface_a.clone().unwrap())
        .collect();
    interfaces.sort();
    assert_eq!(interfaces, vec!["Gi0/0/0/1", "Gi0/0/0/2"]);

    // Interface-qualified ids keep the two physical links distinct
    let ids: std::collections::HashSet<_> =
        topology.physical_links.iter().map(|p| &p.id).collect();
    assert_eq!(ids.len(), 2);
}

/// Neighbors learned on management interfaces and non-FULL states are
/// excluded; an allowlist drops unknown neighbors entirely.
#[test]
fn management_and_unknown_neighbors_are_skipped() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    let neighbors = "\
            OSPF Router with ID (172.16.1.1) (Process ID 1)

Neighbor ID     Pri   State           Dead Time   Address         Interface
172.16.2.2      1     FULL/DR         00:00:35    172.13.0.10     Gi0/0/0/1
172.16.3.3      1     FULL/DR         00:00:35    10.255.0.3      MgmtEth0/RP0/CPU0/0
172.16.4.4      1     INIT            00:00:35    172.13.0.22     Gi0/0/0/3
172.16.9.9      1     FULL/DR         00:00:35    172.13.0.30     Gi0/0/0/4
";
    write_text(text, "aaa-r1", "show_ospf_neighbor", TS, neighbors);
    write_text(
        text,
        "bbb-r2",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.2.2", "172.16.1.1", "172.13.0.9", "Gi0/0/0/1"),
    );

    let valid = vec!["aaa-r1".to_string(), "bbb-r2".to_string()];
    let topology = TopologyBuilder::new(text).build(Some(&valid)).unwrap();

    // Only the aaa-r1 <-> bbb-r2 adjacency survives: the management
    // interface, the INIT state and the 172.16.9.9 stranger are gone
    assert_eq!(topology.links.len(), 2);
    assert!(topology
        .links
        .iter()
        .all(|l| l.source_interface.starts_with("Gi0/0/0/1")));
}

/// The builder reads only the latest file per device and command class.
#[test]
fn stale_artifacts_are_ignored() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    // Older run saw a neighbor; the newer run sees none
    write_text(
        text,
        "aaa-r1",
        "show_ospf_neighbor",
        "2025-03-14_08-00-00",
        &neighbor_output("172.16.1.1", "172.16.2.2", "172.13.0.10", "Gi0/0/0/1"),
    );
    write_text(
        text,
        "aaa-r1",
        "show_ospf_neighbor",
        TS,
        "            OSPF Router with ID (172.16.1.1) (Process ID 1)\n\nNeighbor ID     Pri   State           Dead Time   Address         Interface\n",
    );

    let topology = TopologyBuilder::new(text).build(None).unwrap();
    assert!(topology.links.is_empty());
}

/// Router ids fall back to the `-r<n>` → `172.16.n.n` convention when no
/// `OSPF Router with ID` header is present.
#[test]
fn router_id_fallback_from_hostname() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let text = dir.path();

    // No router id header anywhere; both devices rely on the fallback
    let neighbors_a = "\
Neighbor ID     Pri   State           Dead Time   Address         Interface
172.16.2.2      1     FULL/DR         00:00:35    172.13.0.10     Gi0/0/0/1
";
    write_text(text, "zwe-r1", "show_ospf_neighbor", TS, neighbors_a);
    write_text(
        text,
        "zwe-r2",
        "show_ospf_interface_brief",
        TS,
        "Interfaces for OSPF 1\n",
    );

    let topology = TopologyBuilder::new(text).build(None).unwrap();

    // zwe-r2 was resolved as the neighbor through its inferred router id
    assert_eq!(topology.links.len(), 1);
    assert_eq!(topology.links[0].source, "zwe-r1");
    assert_eq!(topology.links[0].target, "zwe-r2");
}

/// `for_current_execution` resolves through the executions `current`
/// pointer.
#[test]
fn builder_follows_the_current_pointer() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let store = ExecutionStore::new(dir.path().join("executions")).unwrap();
    let paths = store.create_execution("exec_20250314_100000_abcd1234").unwrap();
    store.point_current("exec_20250314_100000_abcd1234").unwrap();

    write_text(
        &paths.text_dir,
        "aaa-r1",
        "show_ospf_neighbor",
        TS,
        &neighbor_output("172.16.1.1", "172.16.2.2", "172.13.0.10", "Gi0/0/0/1"),
    );

    let builder = TopologyBuilder::for_current_execution(&store).unwrap();
    let topology = builder.build(None).unwrap();
    assert_eq!(topology.links.len(), 1);
}
