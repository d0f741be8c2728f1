use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A router from the externally-owned inventory.
///
/// The inventory's own username/password fields are historical artifacts and
/// are never used for authentication; see `CredentialResolver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable inventory identifier.
    pub id: String,
    /// Hostname, FQDN-ish. The first three alphabetic characters encode the
    /// country (ISO 3166-1 alpha-3 convention, e.g. `deu-r6`).
    pub name: String,
    /// Management address.
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub country: Option<String>,
    /// Software string from the inventory, e.g. "IOS-XR 7.3.2".
    #[serde(default)]
    pub software: Option<String>,
    /// Platform string from the inventory, e.g. "ASR9903".
    #[serde(default)]
    pub platform: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Device {
    /// Country bucket for progress aggregation: the explicit inventory value,
    /// else derived from the hostname prefix, else "Unknown".
    pub fn country_bucket(&self) -> String {
        if let Some(country) = &self.country {
            if !country.trim().is_empty() {
                return country.clone();
            }
        }
        let prefix: String = self.name.chars().take(3).collect();
        if prefix.len() == 3 && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            prefix.to_uppercase()
        } else {
            "Unknown".to_string()
        }
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::from_hints(
            self.software.as_deref().unwrap_or(""),
            self.platform.as_deref().unwrap_or(""),
        )
    }
}

/// CLI family of a device. Affects the terminal setup commands and prompt
/// quirks; command syntax is otherwise shared across the Cisco families
/// this engine collects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Classic IOS and IOS-XE.
    Ios,
    /// IOS-XR (ASR9k, XRv).
    IosXr,
    /// NX-OS (Nexus).
    Nxos,
}

impl Dialect {
    /// Deterministic dialect selection from inventory hints.
    ///
    /// Priority: XR software or ASR9 platform, then NX software or NEXUS
    /// platform, then XE (still the IOS dialect), then plain IOS.
    pub fn from_hints(software: &str, platform: &str) -> Self {
        let software = software.to_uppercase();
        let platform = platform.to_uppercase();

        if software.contains("XR") || platform.contains("ASR9") {
            Dialect::IosXr
        } else if software.contains("NX") || platform.contains("NEXUS") {
            Dialect::Nxos
        } else {
            // "XE" and everything else use the IOS dialect.
            Dialect::Ios
        }
    }

    /// Commands sent right after the shell comes up, before any collection.
    pub fn session_preparation_commands(&self) -> &'static [&'static str] {
        match self {
            Dialect::Ios => &["terminal length 0", "terminal width 511"],
            Dialect::IosXr => &["terminal length 0", "terminal width 511"],
            Dialect::Nxos => &["terminal length 0", "terminal width 511"],
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Ios => write!(f, "cisco_ios"),
            Dialect::IosXr => write!(f, "cisco_xr"),
            Dialect::Nxos => write!(f, "cisco_nxos"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_priority_order() {
        assert_eq!(Dialect::from_hints("IOS-XR 7.3", ""), Dialect::IosXr);
        assert_eq!(Dialect::from_hints("", "ASR9903"), Dialect::IosXr);
        assert_eq!(Dialect::from_hints("NX-OS 9.3", ""), Dialect::Nxos);
        assert_eq!(Dialect::from_hints("", "Nexus 9500"), Dialect::Nxos);
        assert_eq!(Dialect::from_hints("IOS-XE 17.6", ""), Dialect::Ios);
        assert_eq!(Dialect::from_hints("", ""), Dialect::Ios);
        // XR beats NX when both hints are present.
        assert_eq!(Dialect::from_hints("XR", "NEXUS"), Dialect::IosXr);
    }

    #[test]
    fn country_bucket_from_hostname() {
        let device = Device {
            id: "d1".to_string(),
            name: "deu-r6.lab.example".to_string(),
            address: "172.16.6.6".to_string(),
            port: 22,
            country: None,
            software: None,
            platform: None,
        };
        assert_eq!(device.country_bucket(), "DEU");
    }

    #[test]
    fn country_bucket_prefers_inventory_value() {
        let device = Device {
            id: "d1".to_string(),
            name: "r1".to_string(),
            address: "10.0.0.1".to_string(),
            port: 22,
            country: Some("ZWE".to_string()),
            software: None,
            platform: None,
        };
        assert_eq!(device.country_bucket(), "ZWE");
    }

    #[test]
    fn country_bucket_rejects_non_alpha_prefix() {
        let device = Device {
            id: "d1".to_string(),
            name: "r1-core".to_string(),
            address: "10.0.0.1".to_string(),
            port: 22,
            country: None,
            software: None,
            platform: None,
        };
        assert_eq!(device.country_bucket(), "Unknown");
    }
}
