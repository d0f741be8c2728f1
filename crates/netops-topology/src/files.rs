//! Latest-file selection over an execution's artifact directories.

use netops_core::execution_store::parse_artifact_file_name;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Command families the topology builder consumes. Classification happens
/// on the artifact file-name slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    Cdp,
    OspfNeighbor,
    OspfDbRouter,
    OspfDbNetwork,
    OspfInterface,
    OspfConfig,
    OspfDb,
}

impl CommandClass {
    /// Classify a slug; more specific classes first so
    /// `show_ospf_database_router` never lands in the generic database
    /// bucket.
    pub fn classify(slug: &str) -> Option<Self> {
        if slug.contains("cdp_neighbor") {
            Some(CommandClass::Cdp)
        } else if slug.contains("ospf_neighbor") {
            Some(CommandClass::OspfNeighbor)
        } else if slug.contains("ospf_database_router") {
            Some(CommandClass::OspfDbRouter)
        } else if slug.contains("ospf_database_network") {
            Some(CommandClass::OspfDbNetwork)
        } else if slug.contains("ospf_interface") {
            Some(CommandClass::OspfInterface)
        } else if slug.contains("running-config_router_ospf") {
            Some(CommandClass::OspfConfig)
        } else if slug.contains("ospf_database") {
            Some(CommandClass::OspfDb)
        } else {
            None
        }
    }
}

/// Latest TEXT artifact per `(device, command class)`, selected by the
/// timestamp embedded in the file name.
pub fn latest_text_files(
    text_dir: &Path,
    valid_devices: Option<&[String]>,
) -> HashMap<String, HashMap<CommandClass, PathBuf>> {
    let mut latest: HashMap<String, HashMap<CommandClass, (chrono::NaiveDateTime, PathBuf)>> =
        HashMap::new();

    let entries = match fs::read_dir(text_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Text directory not readable {}: {}", text_dir.display(), e);
            return HashMap::new();
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.ends_with(".txt") {
            continue;
        }
        let Some(parsed) = parse_artifact_file_name(name) else {
            continue;
        };
        if let Some(valid) = valid_devices {
            if !valid.contains(&parsed.device_name) {
                continue;
            }
        }
        let Some(class) = CommandClass::classify(&parsed.command_slug) else {
            continue;
        };

        let per_device = latest.entry(parsed.device_name.clone()).or_default();
        match per_device.get(&class) {
            Some((existing_ts, _)) if *existing_ts >= parsed.timestamp => {}
            _ => {
                per_device.insert(class, (parsed.timestamp, entry.path()));
            }
        }
    }

    latest
        .into_iter()
        .map(|(device, classes)| {
            (
                device,
                classes
                    .into_iter()
                    .map(|(class, (_, path))| (class, path))
                    .collect(),
            )
        })
        .collect()
}

/// Read the selected files into memory, dropping unreadable ones.
pub fn read_device_files(
    files: HashMap<String, HashMap<CommandClass, PathBuf>>,
) -> HashMap<String, HashMap<CommandClass, String>> {
    let mut contents: HashMap<String, HashMap<CommandClass, String>> = HashMap::new();

    for (device, classes) in files {
        let device_contents = contents.entry(device).or_default();
        for (class, path) in classes {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    device_contents.insert(class, text);
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
    }

    debug!("Loaded artifacts for {} devices", contents.len());
    contents
}

/// JSON artifacts in a directory whose slug matches `predicate`, restricted
/// to `valid_devices` when given.
pub fn matching_json_files(
    json_dir: &Path,
    valid_devices: Option<&[String]>,
    predicate: impl Fn(&str) -> bool,
) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();

    let entries = match fs::read_dir(json_dir) {
        Ok(entries) => entries,
        Err(_) => return files,
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.ends_with(".json") || !predicate(name) {
            continue;
        }
        let Some(parsed) = parse_artifact_file_name(name) else {
            continue;
        };
        if let Some(valid) = valid_devices {
            if !valid.contains(&parsed.device_name) {
                continue;
            }
        }
        files.push((parsed.device_name, entry.path()));
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn classification_prefers_specific_classes() {
        assert_eq!(
            CommandClass::classify("show_cdp_neighbor_detail"),
            Some(CommandClass::Cdp)
        );
        assert_eq!(
            CommandClass::classify("show_ospf_neighbor"),
            Some(CommandClass::OspfNeighbor)
        );
        assert_eq!(
            CommandClass::classify("show_ospf_database_router"),
            Some(CommandClass::OspfDbRouter)
        );
        assert_eq!(
            CommandClass::classify("show_ospf_database_network"),
            Some(CommandClass::OspfDbNetwork)
        );
        assert_eq!(
            CommandClass::classify("show_ospf_interface_brief"),
            Some(CommandClass::OspfInterface)
        );
        assert_eq!(
            CommandClass::classify("show_running-config_router_ospf"),
            Some(CommandClass::OspfConfig)
        );
        assert_eq!(
            CommandClass::classify("show_ospf_database"),
            Some(CommandClass::OspfDb)
        );
        assert_eq!(CommandClass::classify("show_process_cpu"), None);
    }

    #[test]
    fn latest_file_wins_per_class() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("deu-r1_show_ospf_neighbor_2025-03-14_09-00-00.txt"),
            "old",
        )
        .unwrap();
        fs::write(
            dir.path().join("deu-r1_show_ospf_neighbor_2025-03-14_10-00-00.txt"),
            "new",
        )
        .unwrap();
        fs::write(
            dir.path().join("deu-r1_show_ospf_database_2025-03-14_09-30-00.txt"),
            "db",
        )
        .unwrap();

        let files = latest_text_files(dir.path(), None);
        let device_files = read_device_files(files);
        let deu = &device_files["deu-r1"];
        assert_eq!(deu[&CommandClass::OspfNeighbor], "new");
        assert_eq!(deu[&CommandClass::OspfDb], "db");
    }

    #[test]
    fn valid_devices_filter_applies() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("deu-r1_show_ospf_neighbor_2025-03-14_09-00-00.txt"),
            "x",
        )
        .unwrap();
        fs::write(
            dir.path().join("usa-r9_show_ospf_neighbor_2025-03-14_09-00-00.txt"),
            "y",
        )
        .unwrap();

        let valid = vec!["deu-r1".to_string()];
        let files = latest_text_files(dir.path(), Some(&valid));
        assert!(files.contains_key("deu-r1"));
        assert!(!files.contains_key("usa-r9"));
    }
}
