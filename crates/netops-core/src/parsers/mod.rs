//! Structured extraction for Cisco show-command output.
//!
//! Every parser is total: malformed or unexpected input yields an empty
//! result, never an error. The dispatcher maps a command to its parser by
//! prefix and returns the `parsed_data` JSON stored in execution artifacts
//! (`{"parsed": false}` when no parser matched or nothing was extracted).

pub mod bundle;
pub mod cdp;
pub mod interface;
pub mod ospf;
pub mod process;

pub use bundle::{parse_bundles, Bundle, BundleMember};
pub use cdp::{parse_cdp_neighbors_brief, parse_cdp_neighbors_detail, CdpNeighborBrief, CdpNeighborDetail};
pub use interface::{
    parse_interface_brief, parse_interface_descriptions, parse_interfaces_full, InterfaceBrief,
    InterfaceDescription, InterfaceDetail,
};
pub use ospf::{
    parse_configured_costs, parse_lsa_table, parse_network_lsas, parse_ospf_database_router,
    parse_ospf_interface_brief, parse_router_lsa_link_costs, LsaSummary, OspfInterface,
    RouterLsaDatabase, TransitLink,
};
pub use process::{parse_cpu, parse_memory, CpuUtilization, MemoryUtilization};

use serde::Serialize;
use serde_json::{json, Value};

fn tagged<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut map)) => {
            map.insert("parsed".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        _ => json!({ "parsed": false }),
    }
}

fn unparsed() -> Value {
    json!({ "parsed": false })
}

/// Parse raw command output into the structured `parsed_data` record.
pub fn parse_output(command: &str, output: &str) -> Value {
    let cmd = command.trim().to_lowercase();

    if cmd.starts_with("show process cpu") {
        return match parse_cpu(output) {
            Some(cpu) => tagged(&cpu),
            None => unparsed(),
        };
    }

    if cmd.starts_with("show process memory") {
        return match parse_memory(output) {
            Some(memory) => tagged(&memory),
            None => unparsed(),
        };
    }

    if cmd.starts_with("show ospf database router")
        || cmd.starts_with("show ip ospf database router")
    {
        let db = parse_ospf_database_router(output);
        if db.lsas.is_empty() && db.transit_links.is_empty() {
            return unparsed();
        }
        return tagged(&db);
    }

    if cmd.starts_with("show ospf database network")
        || cmd.starts_with("show ip ospf database network")
    {
        let networks = parse_network_lsas(output);
        if networks.is_empty() {
            return unparsed();
        }
        return json!({ "parsed": true, "networks": networks });
    }

    if cmd.starts_with("show ospf interface") || cmd.starts_with("show ip ospf interface") {
        let interfaces = parse_ospf_interface_brief(output);
        if interfaces.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "interfaces": interfaces,
            "interface_count": interfaces.len(),
        });
    }

    if cmd.starts_with("show ospf database") || cmd.starts_with("show ip ospf database") {
        let lsas = parse_lsa_table(output);
        if lsas.is_empty() {
            return unparsed();
        }
        return json!({ "parsed": true, "lsas": lsas, "lsa_count": lsas.len() });
    }

    if cmd.starts_with("show running-config router ospf") {
        let costs = parse_configured_costs(output);
        if costs.is_empty() {
            return unparsed();
        }
        return json!({ "parsed": true, "configured_costs": costs });
    }

    if cmd.starts_with("show cdp neighbor detail") || cmd.starts_with("show cdp neighbors detail") {
        let neighbors = parse_cdp_neighbors_detail(output);
        if neighbors.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "cdp_neighbors": neighbors,
            "neighbor_count": neighbors.len(),
        });
    }

    if cmd.starts_with("show cdp neighbor") || cmd.starts_with("show cdp neighbors") {
        let neighbors = parse_cdp_neighbors_brief(output);
        if neighbors.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "neighbors": neighbors,
            "neighbor_count": neighbors.len(),
        });
    }

    if cmd.starts_with("show interface brief") || cmd.starts_with("show ipv4 interface brief") {
        let interfaces = parse_interface_brief(output);
        if interfaces.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "interfaces": interfaces,
            "interface_count": interfaces.len(),
        });
    }

    if cmd.starts_with("show interface description") {
        let interfaces = parse_interface_descriptions(output);
        if interfaces.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "interfaces": interfaces,
            "interface_count": interfaces.len(),
        });
    }

    if cmd.starts_with("show bundle") {
        let bundles = parse_bundles(output);
        if bundles.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "bundles": bundles,
            "bundle_count": bundles.len(),
        });
    }

    if cmd == "show interface" || cmd.starts_with("show interface ") || cmd == "show interfaces" {
        let interfaces = parse_interfaces_full(output);
        if interfaces.is_empty() {
            return unparsed();
        }
        return json!({
            "parsed": true,
            "interfaces": interfaces,
            "interface_count": interfaces.len(),
        });
    }

    unparsed()
}
