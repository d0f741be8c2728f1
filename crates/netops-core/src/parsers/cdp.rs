use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref DETAIL_INTERFACE: Regex =
        Regex::new(r"Interface:\s+(\S+?),.*Port ID.*:\s+(\S+)").unwrap();
    // Interface name tokens as they appear in the brief table, long or short
    static ref INTERFACE_TOKEN: Regex =
        Regex::new(r"(Gig|Gi|Fast|Fa|Ten|Te|Hu|Fo|Eth|BE)").unwrap();
}

/// One neighbor from `show cdp neighbor detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdpNeighborDetail {
    pub device_id: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub local_interface: String,
    #[serde(default)]
    pub remote_interface: String,
    #[serde(default)]
    pub ip_address: String,
}

/// One neighbor row from the brief `show cdp neighbor` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdpNeighborBrief {
    pub device_id: String,
    pub local_interface: String,
    pub remote_interface: String,
}

/// Parse `show cdp neighbor detail` blocks.
pub fn parse_cdp_neighbors_detail(output: &str) -> Vec<CdpNeighborDetail> {
    let mut neighbors = Vec::new();
    let mut current: Option<CdpNeighborDetail> = None;

    for line in output.lines() {
        if line.contains("Device ID:") {
            if let Some(neighbor) = current.take() {
                neighbors.push(neighbor);
            }
            let device_id = line.rsplit(':').next().unwrap_or("").trim().to_string();
            current = Some(CdpNeighborDetail {
                device_id,
                ..CdpNeighborDetail::default()
            });
            continue;
        }

        let Some(neighbor) = current.as_mut() else {
            continue;
        };

        if line.contains("Platform:") {
            // "Platform: cisco XRv9000, Capabilities: Router"
            let platform = line
                .split(',')
                .next()
                .unwrap_or("")
                .replace("Platform:", "")
                .trim()
                .to_string();
            neighbor.platform = platform;
        } else if line.contains("Interface:") {
            if let Some(caps) = DETAIL_INTERFACE.captures(line) {
                neighbor.local_interface = caps[1].to_string();
                neighbor.remote_interface = caps[2].to_string();
            }
        } else if line.contains("IP address:") {
            neighbor.ip_address = line.rsplit(':').next().unwrap_or("").trim().to_string();
        }
    }

    if let Some(neighbor) = current {
        neighbors.push(neighbor);
    }

    neighbors
}

/// Parse the brief `show cdp neighbor` table.
///
/// Long device names wrap the row onto a continuation line; continuation
/// lines start with whitespace and are skipped, matching how the table is
/// actually rendered.
pub fn parse_cdp_neighbors_brief(output: &str) -> Vec<CdpNeighborBrief> {
    let mut neighbors = Vec::new();

    for line in output.lines() {
        // Header and legend lines
        if line.contains("Device ID") || line.contains("Capability") || line.trim().is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        if !INTERFACE_TOKEN.is_match(line) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 6 {
            let local_interface = join_interface_token(parts[1], parts.get(2).copied());
            let remote_interface = {
                let last = parts[parts.len() - 1];
                if starts_with_digit(last) && is_bare_interface_type(parts[parts.len() - 2]) {
                    format!("{}{}", parts[parts.len() - 2], last)
                } else {
                    last.to_string()
                }
            };
            neighbors.push(CdpNeighborBrief {
                device_id: parts[0].to_string(),
                local_interface,
                remote_interface,
            });
        }
    }

    neighbors
}

// "Gig 0/0/0/0" renders as two whitespace-separated tokens; rejoin them.
// Only a bare type token ("Gig", "Te") takes the following number.
fn join_interface_token(first: &str, second: Option<&str>) -> String {
    match second {
        Some(token) if is_bare_interface_type(first) && starts_with_digit(token) => {
            format!("{}{}", first, token)
        }
        _ => first.to_string(),
    }
}

fn is_bare_interface_type(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphabetic())
}

fn starts_with_digit(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detail_blocks() {
        let output = "\
-------------------------
Device ID: deu-r6.lab.example
SysName : deu-r6
Entry address(es):
  IP address: 172.16.6.6
Platform: cisco IOS-XRv 9000,  Capabilities: Router
Interface: GigabitEthernet0/0/0/1,  Port ID (outgoing port): GigabitEthernet0/0/0/4
Holdtime : 139 sec

-------------------------
Device ID: fra-r2
Entry address(es):
  IP address: 172.16.2.2
Platform: ASR9K,  Capabilities: Router Switch
Interface: TenGigE0/0/0/0,  Port ID (outgoing port): TenGigE0/0/0/3
";
        let neighbors = parse_cdp_neighbors_detail(output);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].device_id, "deu-r6.lab.example");
        assert_eq!(neighbors[0].platform, "cisco IOS-XRv 9000");
        assert_eq!(neighbors[0].local_interface, "GigabitEthernet0/0/0/1");
        assert_eq!(neighbors[0].remote_interface, "GigabitEthernet0/0/0/4");
        assert_eq!(neighbors[0].ip_address, "172.16.6.6");
        assert_eq!(neighbors[1].device_id, "fra-r2");
    }

    #[test]
    fn parses_brief_table_with_split_interface_tokens() {
        let output = "\
Capability Codes: R - Router, T - Trans Bridge, B - Source Route Bridge
                  S - Switch, H - Host, I - IGMP, r - Repeater

Device ID        Local Intrfce     Holdtme    Capability  Platform  Port ID
usa-r2           Gig 0/0/0/0       179        R I         ASR9K     Gig 0/0/0/0
deu-r6.lab.exam  Gi0/0/0/4         164        R           IOS-XRv 9 Gi0/0/0/4
";
        let neighbors = parse_cdp_neighbors_brief(output);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].device_id, "usa-r2");
        assert_eq!(neighbors[0].local_interface, "Gig0/0/0/0");
        assert_eq!(neighbors[0].remote_interface, "Gig0/0/0/0");
        assert_eq!(neighbors[1].local_interface, "Gi0/0/0/4");
    }

    #[test]
    fn wrapped_continuation_lines_are_skipped() {
        let output = "\
Device ID        Local Intrfce     Holdtme    Capability  Platform  Port ID
very-long-device-name.with.a.domain.example
                 Gig 0/0/0/1       120        R           ASR9K     Gig 0/0/0/2
usa-r2           Gig 0/0/0/0       179        R I         ASR9K     Gig 0/0/0/0
";
        let neighbors = parse_cdp_neighbors_brief(output);
        // The wrapped entry is dropped rather than mis-parsed
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].device_id, "usa-r2");
    }

    #[test]
    fn empty_output_is_empty() {
        assert!(parse_cdp_neighbors_brief("").is_empty());
        assert!(parse_cdp_neighbors_detail("").is_empty());
    }
}
