use crate::error::TransformError;
use crate::files::matching_json_files;
use crate::interface_names::{
    capacity_from_interface_type, hardware_bandwidth_kbps, is_physical_interface,
    normalize_interface_name, parent_interface,
};
use crate::model::{CdpNeighborRecord, InterfaceCapacity, TransformResults};
use chrono::Utc;
use netops_core::execution_store::ExecutionStore;
use netops_core::parsers::bundle::Bundle;
use netops_core::parsers::cdp::parse_cdp_neighbors_brief;
use netops_core::parsers::ospf::parse_ospf_interface_brief;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Transforms the latest execution's JSON outputs into interface-capacity
/// and CDP-neighbor records.
///
/// Bundle data is loaded first so Bundle-Ether interfaces report their real
/// aggregated capacity; full `show interface` output is preferred, with
/// `show ospf interface brief` as the fallback inventory source.
pub struct InterfaceTransformer {
    json_dir: PathBuf,
    /// `(device, upper-cased bundle name)` → bundle; keyed under both the
    /// long and short spellings.
    bundle_data: HashMap<(String, String), Bundle>,
}

impl InterfaceTransformer {
    pub fn new(json_dir: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: json_dir.into(),
            bundle_data: HashMap::new(),
        }
    }

    pub fn for_current_execution(store: &ExecutionStore) -> Result<Self, TransformError> {
        let paths = store.current_execution().ok_or_else(|| {
            TransformError::NoData("no current execution to transform".to_string())
        })?;
        info!(execution_id = %paths.execution_id, "Interface transformer using current execution");
        Ok(Self::new(paths.json_dir))
    }

    /// Run the transformation. Returns the derived records plus a summary;
    /// persistence is the caller's concern.
    pub fn transform(
        &mut self,
        valid_devices: Option<&[String]>,
    ) -> (Vec<InterfaceCapacity>, Vec<CdpNeighborRecord>, TransformResults) {
        info!("Starting interface transformation");
        let mut results = TransformResults::default();

        let interface_files = matching_json_files(&self.json_dir, valid_devices, |name| {
            (name.contains("show_interface") || name.contains("show_int"))
                && !name.contains("show_ospf_interface")
        });
        let ospf_interface_files = matching_json_files(&self.json_dir, valid_devices, |name| {
            name.contains("show_ospf_interface_brief")
        });
        let cdp_files =
            matching_json_files(&self.json_dir, valid_devices, |name| name.contains("show_cdp"));
        let bundle_files = matching_json_files(&self.json_dir, valid_devices, |name| {
            name.contains("show_bundle")
        });

        info!(
            "Found {} interface files, {} OSPF interface files, {} CDP files, {} bundle files",
            interface_files.len(),
            ospf_interface_files.len(),
            cdp_files.len(),
            bundle_files.len()
        );

        self.load_bundle_data(&bundle_files, &mut results);
        info!("Loaded bundle data for {} LAG keys", self.bundle_data.len());

        let mut interfaces: Vec<InterfaceCapacity> = Vec::new();
        for (device, path) in &interface_files {
            match self.parse_interface_file(path, device) {
                Ok(mut parsed) => {
                    interfaces.append(&mut parsed);
                    if !results.devices_processed.contains(device) {
                        results.devices_processed.push(device.clone());
                    }
                }
                Err(e) => results.errors.push(format!("{}: {}", path.display(), e)),
            }
        }

        // Fallback: derive a basic inventory from OSPF interface brief
        if interfaces.is_empty() && !ospf_interface_files.is_empty() {
            info!("No full interface data found, using OSPF interface brief fallback");
            results.source = Some("ospf_interface_brief_fallback".to_string());

            for (device, path) in &ospf_interface_files {
                match self.parse_ospf_interface_file(path, device) {
                    Ok(mut parsed) => {
                        interfaces.append(&mut parsed);
                        if !results.devices_processed.contains(device) {
                            results.devices_processed.push(device.clone());
                        }
                    }
                    Err(e) => results.errors.push(format!("{}: {}", path.display(), e)),
                }
            }
        }

        let mut cdp_neighbors: Vec<CdpNeighborRecord> = Vec::new();
        for (device, path) in &cdp_files {
            match parse_cdp_file(path, device) {
                Ok(mut parsed) => cdp_neighbors.append(&mut parsed),
                Err(e) => results.errors.push(format!("{}: {}", path.display(), e)),
            }
        }

        correlate_interfaces_with_cdp(&mut interfaces, &cdp_neighbors);

        results.interfaces_processed = interfaces.len();
        results.cdp_neighbors_processed = cdp_neighbors.len();
        info!(
            "Interface transformation complete: {} interfaces, {} CDP neighbors",
            interfaces.len(),
            cdp_neighbors.len()
        );

        (interfaces, cdp_neighbors, results)
    }

    fn load_bundle_data(&mut self, bundle_files: &[(String, PathBuf)], results: &mut TransformResults) {
        self.bundle_data.clear();

        for (device, path) in bundle_files {
            let parsed: Option<Vec<Bundle>> = read_artifact(path)
                .ok()
                .and_then(|v| v.get("parsed_data").cloned())
                .and_then(|p| p.get("bundles").cloned())
                .and_then(|b| serde_json::from_value(b).ok());

            let Some(bundles) = parsed else {
                debug!("No bundle data in {}", path.display());
                continue;
            };

            for bundle in bundles {
                let name = bundle.bundle_name.to_uppercase();
                if name.is_empty() {
                    continue;
                }

                // Key under both spellings so lookups succeed either way
                if let Some(num) = name.strip_prefix("BUNDLE-ETHER") {
                    self.bundle_data
                        .insert((device.clone(), format!("BE{}", num)), bundle.clone());
                } else if let Some(num) = name.strip_prefix("BE") {
                    self.bundle_data
                        .insert((device.clone(), format!("BUNDLE-ETHER{}", num)), bundle.clone());
                }
                self.bundle_data.insert((device.clone(), name), bundle);
            }
        }

        if self.bundle_data.is_empty() && !bundle_files.is_empty() {
            results
                .errors
                .push("bundle files present but none parsed".to_string());
        }
    }

    /// Aggregated capacity class for a Bundle-Ether interface, if known.
    fn bundle_capacity(&self, device: &str, interface: &str) -> Option<String> {
        let mut name = interface.to_uppercase();
        // Subinterfaces inherit the parent bundle's capacity
        if let Some((parent, _)) = name.split_once('.') {
            name = parent.to_string();
        }
        self.bundle_data
            .get(&(device.to_string(), name))
            .map(|b| b.capacity_class.clone())
    }

    fn capacity_class_for(&self, device: &str, interface: &str, reported: Option<&str>) -> String {
        let hw_interface = parent_interface(interface).unwrap_or_else(|| interface.to_string());

        if hw_interface.to_uppercase().starts_with("BUNDLE-ETHER")
            || hw_interface.to_uppercase().starts_with("BE")
        {
            return self
                .bundle_capacity(device, &hw_interface)
                .unwrap_or_else(|| "LAG".to_string());
        }

        match reported {
            Some(class) if !class.is_empty() && class != "Unknown" => class.to_string(),
            _ => capacity_from_interface_type(&hw_interface).to_string(),
        }
    }

    /// Interfaces from one full `show interface` JSON artifact. The three
    /// interface-command shapes (full, brief, description) share field
    /// names, so extraction works over the generic parsed value.
    fn parse_interface_file(
        &self,
        path: &Path,
        device: &str,
    ) -> Result<Vec<InterfaceCapacity>, TransformError> {
        let artifact = read_artifact(path)?;
        let parsed = &artifact["parsed_data"];
        if !parsed["parsed"].as_bool().unwrap_or(false) {
            return Ok(Vec::new());
        }

        let Some(raw_interfaces) = parsed["interfaces"].as_array() else {
            return Ok(Vec::new());
        };

        let mut interfaces = Vec::new();
        for intf in raw_interfaces {
            let raw_name = intf["interface"].as_str().unwrap_or("");
            let name = normalize_interface_name(raw_name);
            if name.is_empty() {
                continue;
            }

            let is_physical = is_physical_interface(&name);
            let parent = if is_physical {
                None
            } else {
                parent_interface(&name)
            };

            let capacity_class =
                self.capacity_class_for(device, &name, intf["capacity_class"].as_str());

            interfaces.push(InterfaceCapacity {
                id: Uuid::new_v4().to_string(),
                router: device.to_string(),
                interface: name,
                description: intf["description"].as_str().unwrap_or("").to_string(),
                admin_status: intf["admin_status"]
                    .as_str()
                    .or_else(|| intf["state"].as_str())
                    .or_else(|| intf["status"].as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                line_protocol: intf["line_protocol"]
                    .as_str()
                    .or_else(|| intf["protocol"].as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                bw_kbps: intf["bw_kbps"].as_u64().unwrap_or(0),
                capacity_class,
                input_rate_bps: intf["input_rate_bps"].as_u64().unwrap_or(0),
                output_rate_bps: intf["output_rate_bps"].as_u64().unwrap_or(0),
                input_utilization_pct: intf["input_utilization_pct"].as_f64().unwrap_or(0.0),
                output_utilization_pct: intf["output_utilization_pct"].as_f64().unwrap_or(0.0),
                mac_address: intf["mac_address"].as_str().unwrap_or("").to_string(),
                mtu: intf["mtu"].as_u64().unwrap_or(0) as u32,
                encapsulation: intf["encap"].as_str().unwrap_or("").to_string(),
                is_physical,
                parent_interface: parent,
                neighbor_router: None,
                neighbor_interface: None,
                updated_at: Utc::now(),
            });
        }

        Ok(interfaces)
    }

    /// Fallback inventory from `show ospf interface brief` raw output.
    /// Bandwidth comes from the hardware interface type, never from the
    /// OSPF cost.
    fn parse_ospf_interface_file(
        &self,
        path: &Path,
        device: &str,
    ) -> Result<Vec<InterfaceCapacity>, TransformError> {
        let artifact = read_artifact(path)?;
        let Some(raw_output) = artifact["raw_output"].as_str() else {
            return Ok(Vec::new());
        };

        let mut interfaces = Vec::new();
        for row in parse_ospf_interface_brief(raw_output) {
            let name = normalize_interface_name(&row.interface);
            if name.is_empty() {
                continue;
            }

            let is_physical = is_physical_interface(&name);
            let parent = if is_physical {
                None
            } else {
                parent_interface(&name)
            };
            let hw_interface = parent.clone().unwrap_or_else(|| name.clone());
            let capacity_class = self.capacity_class_for(device, &name, None);
            let bw_kbps = if capacity_class == "LAG" {
                0
            } else {
                hardware_bandwidth_kbps(capacity_from_interface_type(&hw_interface))
            };

            let line_up = matches!(row.state.as_str(), "DR" | "BDR" | "DROTHER" | "P2P" | "LOOP" | "WAIT");

            interfaces.push(InterfaceCapacity {
                id: Uuid::new_v4().to_string(),
                router: device.to_string(),
                interface: name,
                description: format!("OSPF Area {} - {}", row.area, row.ip_mask),
                admin_status: if row.state == "DOWN" { "down" } else { "up" }.to_string(),
                line_protocol: if line_up { "up" } else { "down" }.to_string(),
                bw_kbps,
                capacity_class,
                input_rate_bps: 0,
                output_rate_bps: 0,
                input_utilization_pct: 0.0,
                output_utilization_pct: 0.0,
                mac_address: String::new(),
                mtu: 0,
                encapsulation: String::new(),
                is_physical,
                parent_interface: parent,
                neighbor_router: None,
                neighbor_interface: None,
                updated_at: Utc::now(),
            });
        }

        debug!(
            device,
            "Parsed {} interfaces from OSPF brief fallback",
            interfaces.len()
        );
        Ok(interfaces)
    }
}

fn read_artifact(path: &Path) -> Result<Value, TransformError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// CDP neighbor records from one CDP JSON artifact: prefer the parsed
/// detail list, then the brief list, then a raw-output parse.
fn parse_cdp_file(path: &Path, device: &str) -> Result<Vec<CdpNeighborRecord>, TransformError> {
    let artifact = read_artifact(path)?;
    let parsed = &artifact["parsed_data"];

    let raw_neighbors: Vec<Value> = parsed["cdp_neighbors"]
        .as_array()
        .or_else(|| parsed["neighbors"].as_array())
        .cloned()
        .unwrap_or_else(|| {
            artifact["raw_output"]
                .as_str()
                .map(|raw| {
                    parse_cdp_neighbors_brief(raw)
                        .into_iter()
                        .filter_map(|n| serde_json::to_value(n).ok())
                        .collect()
                })
                .unwrap_or_default()
        });

    let mut neighbors = Vec::new();
    for nbr in raw_neighbors {
        let device_id = nbr["device_id"].as_str().unwrap_or("");
        if device_id.is_empty() {
            continue;
        }
        // Strip the domain suffix from FQDN device ids
        let remote_router = device_id.split('.').next().unwrap_or(device_id).to_string();

        neighbors.push(CdpNeighborRecord {
            id: Uuid::new_v4().to_string(),
            local_router: device.to_string(),
            local_interface: normalize_interface_name(
                nbr["local_interface"].as_str().unwrap_or(""),
            ),
            remote_router,
            remote_interface: normalize_interface_name(
                nbr["remote_interface"].as_str().unwrap_or(""),
            ),
            remote_platform: nbr["platform"].as_str().unwrap_or("").to_string(),
            remote_ip: nbr["ip_address"].as_str().unwrap_or("").to_string(),
            updated_at: Utc::now(),
        });
    }

    Ok(neighbors)
}

/// Join interfaces to CDP rows on `(router, normalized local interface)`.
fn correlate_interfaces_with_cdp(
    interfaces: &mut [InterfaceCapacity],
    cdp_neighbors: &[CdpNeighborRecord],
) {
    let mut lookup: HashMap<(&str, &str), &CdpNeighborRecord> = HashMap::new();
    for nbr in cdp_neighbors {
        lookup.insert((nbr.local_router.as_str(), nbr.local_interface.as_str()), nbr);
    }

    for intf in interfaces.iter_mut() {
        if let Some(nbr) = lookup.get(&(intf.router.as_str(), intf.interface.as_str())) {
            intf.neighbor_router = Some(nbr.remote_router.clone());
            intf.neighbor_interface = Some(nbr.remote_interface.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_artifact(dir: &Path, name: &str, value: &Value) {
        fs::write(dir.join(name), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn interface_artifact() -> Value {
        json!({
            "command": "show interface",
            "device_id": "d1",
            "device_name": "deu-r1",
            "timestamp": "2025-03-14T09:26:53Z",
            "execution_time_seconds": 1.2,
            "parsed_data": {
                "parsed": true,
                "interfaces": [
                    {
                        "interface": "GigabitEthernet0/0/0/1",
                        "admin_status": "up",
                        "line_protocol": "up",
                        "bw_kbps": 1000000,
                        "input_rate_bps": 250000,
                        "output_rate_bps": 0,
                        "input_utilization_pct": 0.03,
                        "output_utilization_pct": 0.0,
                        "capacity_class": "1G",
                        "description": "uplink"
                    },
                    {
                        "interface": "Bundle-Ether200",
                        "admin_status": "up",
                        "line_protocol": "up",
                        "bw_kbps": 2000000,
                        "capacity_class": "Unknown"
                    },
                    {
                        "interface": "GigabitEthernet0/0/0/2.300",
                        "admin_status": "up",
                        "line_protocol": "up",
                        "bw_kbps": 1000000
                    }
                ]
            },
            "raw_output": ""
        })
    }

    fn bundle_artifact() -> Value {
        json!({
            "command": "show bundle",
            "device_name": "deu-r1",
            "parsed_data": {
                "parsed": true,
                "bundles": [
                    {
                        "bundle_name": "Bundle-Ether200",
                        "status": "Up",
                        "active_links": 2,
                        "standby_links": 0,
                        "configured_links": 2,
                        "members": [],
                        "total_bandwidth_kbps": 2000000,
                        "active_bandwidth_kbps": 2000000,
                        "capacity_class": "2G"
                    }
                ]
            },
            "raw_output": ""
        })
    }

    fn cdp_artifact() -> Value {
        json!({
            "command": "show cdp neighbor detail",
            "device_name": "deu-r1",
            "parsed_data": {
                "parsed": true,
                "cdp_neighbors": [
                    {
                        "device_id": "fra-r2.lab.example",
                        "platform": "cisco IOS-XRv 9000",
                        "local_interface": "GigabitEthernet0/0/0/1",
                        "remote_interface": "GigabitEthernet0/0/0/4",
                        "ip_address": "172.16.2.2"
                    }
                ]
            },
            "raw_output": ""
        })
    }

    #[test]
    fn full_transform_with_bundles_and_cdp() {
        let dir = TempDir::new().unwrap();
        write_artifact(
            dir.path(),
            "deu-r1_show_interface_2025-03-14_09-26-53.json",
            &interface_artifact(),
        );
        write_artifact(
            dir.path(),
            "deu-r1_show_bundle_2025-03-14_09-26-55.json",
            &bundle_artifact(),
        );
        write_artifact(
            dir.path(),
            "deu-r1_show_cdp_neighbor_detail_2025-03-14_09-26-57.json",
            &cdp_artifact(),
        );

        let mut transformer = InterfaceTransformer::new(dir.path());
        let (interfaces, cdp, results) = transformer.transform(None);

        assert_eq!(results.interfaces_processed, 3);
        assert_eq!(results.cdp_neighbors_processed, 1);
        assert!(results.errors.is_empty());

        // Names are normalized to the abbreviated canonical form
        let gi = interfaces
            .iter()
            .find(|i| i.interface == "Gi0/0/0/1")
            .unwrap();
        assert!(gi.is_physical);
        assert_eq!(gi.capacity_class, "1G");
        // CDP correlation resolved through the normalized key
        assert_eq!(gi.neighbor_router.as_deref(), Some("fra-r2"));
        assert_eq!(gi.neighbor_interface.as_deref(), Some("Gi0/0/0/4"));

        // Bundle capacity comes from the loaded bundle data
        let be = interfaces.iter().find(|i| i.interface == "BE200").unwrap();
        assert_eq!(be.capacity_class, "2G");

        // Subinterface: logical, parent recorded
        let sub = interfaces
            .iter()
            .find(|i| i.interface == "Gi0/0/0/2.300")
            .unwrap();
        assert!(!sub.is_physical);
        assert_eq!(sub.parent_interface.as_deref(), Some("Gi0/0/0/2"));

        // CDP record keeps the domain-stripped remote router
        assert_eq!(cdp[0].remote_router, "fra-r2");
        assert_eq!(cdp[0].local_interface, "Gi0/0/0/1");
    }

    #[test]
    fn bundle_without_data_reports_lag() {
        let dir = TempDir::new().unwrap();
        write_artifact(
            dir.path(),
            "deu-r1_show_interface_2025-03-14_09-26-53.json",
            &interface_artifact(),
        );

        let mut transformer = InterfaceTransformer::new(dir.path());
        let (interfaces, _, _) = transformer.transform(None);

        let be = interfaces.iter().find(|i| i.interface == "BE200").unwrap();
        assert_eq!(be.capacity_class, "LAG");
    }

    #[test]
    fn ospf_brief_fallback_when_no_interface_files() {
        let dir = TempDir::new().unwrap();
        let raw = "\
Interfaces for OSPF 1

Interface          PID   Area            IP Address/Mask    Cost  State Nbrs F/C
Lo0                1     0               172.16.10.10/32    1     LOOP  0/0
Gi0/0/0/1          1     0               172.13.0.37/30     600   DR    1/1
Te0/0/0/2          1     0               172.13.0.41/30     100   DOWN  0/0
";
        write_artifact(
            dir.path(),
            "deu-r1_show_ospf_interface_brief_2025-03-14_09-26-53.json",
            &json!({
                "command": "show ospf interface brief",
                "device_name": "deu-r1",
                "parsed_data": { "parsed": false },
                "raw_output": raw
            }),
        );

        let mut transformer = InterfaceTransformer::new(dir.path());
        let (interfaces, _, results) = transformer.transform(None);

        assert_eq!(results.source.as_deref(), Some("ospf_interface_brief_fallback"));
        assert_eq!(interfaces.len(), 3);

        let gi = interfaces
            .iter()
            .find(|i| i.interface == "Gi0/0/0/1")
            .unwrap();
        // Bandwidth comes from the hardware type, not the OSPF cost
        assert_eq!(gi.bw_kbps, 1_000_000);
        assert_eq!(gi.capacity_class, "1G");
        assert_eq!(gi.line_protocol, "up");

        let te = interfaces
            .iter()
            .find(|i| i.interface == "Te0/0/0/2")
            .unwrap();
        assert_eq!(te.admin_status, "down");
        assert_eq!(te.capacity_class, "10G");
    }

    #[test]
    fn valid_devices_filter_limits_processing() {
        let dir = TempDir::new().unwrap();
        write_artifact(
            dir.path(),
            "deu-r1_show_interface_2025-03-14_09-26-53.json",
            &interface_artifact(),
        );

        let mut transformer = InterfaceTransformer::new(dir.path());
        let valid = vec!["usa-r9".to_string()];
        let (interfaces, _, _) = transformer.transform(Some(&valid));
        assert!(interfaces.is_empty());
    }
}
