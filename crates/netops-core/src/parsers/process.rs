use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref CPU_1MIN: Regex = Regex::new(r"one minute: (\d+)%").unwrap();
    static ref CPU_5MIN: Regex = Regex::new(r"five minutes: (\d+)%").unwrap();
    static ref MEMORY: Regex =
        Regex::new(r"(?i)Total:\s*(\d+).*Used:\s*(\d+).*Free:\s*(\d+)").unwrap();
}

/// Parsed `show process cpu` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuUtilization {
    pub cpu_1min: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_5min: Option<u32>,
}

/// Parsed `show process memory` output, bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUtilization {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl MemoryUtilization {
    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64) * 100.0
    }
}

pub fn parse_cpu(output: &str) -> Option<CpuUtilization> {
    let cpu_1min = CPU_1MIN
        .captures(output)
        .and_then(|c| c[1].parse().ok())?;
    let cpu_5min = CPU_5MIN.captures(output).and_then(|c| c[1].parse().ok());
    Some(CpuUtilization { cpu_1min, cpu_5min })
}

pub fn parse_memory(output: &str) -> Option<MemoryUtilization> {
    let caps = MEMORY.captures(output)?;
    Some(MemoryUtilization {
        total: caps[1].parse().ok()?,
        used: caps[2].parse().ok()?,
        free: caps[3].parse().ok()?,
    })
}
