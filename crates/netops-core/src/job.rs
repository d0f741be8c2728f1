use crate::device::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Stopping,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Lifecycle of one device inside a job:
/// pending → connecting → connected → executing →
/// (completed | failed | connection_failed) → disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Pending,
    Connecting,
    Connected,
    Executing,
    Completed,
    Failed,
    ConnectionFailed,
    Disconnecting,
    Disconnected,
}

impl DeviceStatus {
    /// Whether the device is actively being worked on.
    pub fn is_running_like(&self) -> bool {
        matches!(
            self,
            DeviceStatus::Connecting
                | DeviceStatus::Connected
                | DeviceStatus::Executing
                | DeviceStatus::Disconnecting
        )
    }

    /// Legal forward transitions of the device state machine.
    pub fn can_transition_to(&self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;
        match self {
            Pending => matches!(next, Connecting | Failed),
            Connecting => matches!(next, Connected | ConnectionFailed),
            Connected => matches!(next, Executing | Completed | Failed | Disconnecting),
            Executing => matches!(next, Completed | Failed | Disconnecting),
            Completed | Failed | ConnectionFailed => matches!(next, Disconnecting | Disconnected),
            Disconnecting => matches!(next, Disconnected),
            Disconnected => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Aggregate outcome of one device's command run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceResult {
    Success,
    PartialSuccess,
    Failed,
}

/// Progress of one command on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandProgress {
    pub command: String,
    pub status: CommandStatus,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandProgress {
    pub fn pending(command: &str) -> Self {
        Self {
            command: command.to_string(),
            status: CommandStatus::Pending,
            percent: 0,
            execution_time: None,
            error: None,
        }
    }
}

/// Progress of one device inside a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProgress {
    pub device_name: String,
    pub country: String,
    pub status: DeviceStatus,
    pub completed_commands: u32,
    pub total_commands: u32,
    pub percent: u8,
    pub commands: Vec<CommandProgress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Aggregate outcome, recorded when the command loop finishes. Used to
    /// bucket disconnected devices in the country aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DeviceResult>,
}

impl DeviceProgress {
    pub fn new(device: &Device) -> Self {
        Self {
            device_name: device.name.clone(),
            country: device.country_bucket(),
            status: DeviceStatus::Pending,
            completed_commands: 0,
            total_commands: 0,
            percent: 0,
            commands: Vec::new(),
            errors: Vec::new(),
            result: None,
        }
    }
}

/// Per-country aggregation over the devices sharing a country bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryStats {
    pub total_devices: u32,
    pub completed_devices: u32,
    pub running_devices: u32,
    pub failed_devices: u32,
    pub pending_devices: u32,
    pub total_commands: u32,
    pub completed_commands: u32,
    pub device_percent: u8,
    pub command_percent: u8,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
}

/// The device and command currently in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentDevice {
    pub device_id: String,
    pub device_name: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_commands: Option<u32>,
}

/// Compact per-device outcome stored on the job once a device finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRunResult {
    pub device_id: String,
    pub device_name: String,
    pub status: DeviceResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Root aggregate for one automation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_devices: u32,
    pub completed_devices: u32,
    pub progress_percent: u8,
    pub stop_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_device: Option<CurrentDevice>,
    pub device_progress: HashMap<String, DeviceProgress>,
    pub country_stats: HashMap<String, CountryStats>,
    pub results: HashMap<String, DeviceRunResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Job {
    pub fn new(id: String, devices: &[Device]) -> Self {
        let mut device_progress = HashMap::new();
        let mut country_stats: HashMap<String, CountryStats> = HashMap::new();

        for device in devices {
            let progress = DeviceProgress::new(device);
            let stats = country_stats.entry(progress.country.clone()).or_default();
            stats.total_devices += 1;
            stats.pending_devices += 1;
            device_progress.insert(device.id.clone(), progress);
        }

        Self {
            id,
            status: JobStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            total_devices: devices.len() as u32,
            completed_devices: 0,
            progress_percent: 0,
            stop_requested: false,
            execution_id: None,
            current_device: None,
            device_progress,
            country_stats,
            results: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// `⌊completed/total·100⌋`
    pub fn recompute_progress(&mut self) {
        self.progress_percent = percent(self.completed_devices, self.total_devices);
    }

    /// Recompute every country aggregate from the device-progress map.
    /// Pure function of the current device states; counters are reset and
    /// rebuilt on every call.
    pub fn recompute_country_stats(&mut self) {
        let now = Utc::now();

        for stats in self.country_stats.values_mut() {
            stats.completed_devices = 0;
            stats.running_devices = 0;
            stats.failed_devices = 0;
            stats.pending_devices = 0;
        }

        for progress in self.device_progress.values() {
            let Some(stats) = self.country_stats.get_mut(&progress.country) else {
                continue;
            };

            match progress.status {
                DeviceStatus::Completed => stats.completed_devices += 1,
                DeviceStatus::Failed | DeviceStatus::ConnectionFailed => {
                    stats.failed_devices += 1
                }
                status if status.is_running_like() => {
                    stats.running_devices += 1;
                    if stats.start_time.is_none() {
                        stats.start_time = Some(now);
                    }
                }
                DeviceStatus::Disconnected => {
                    // Terminal; bucket by the recorded outcome.
                    match progress.result {
                        Some(DeviceResult::Success) | Some(DeviceResult::PartialSuccess) => {
                            stats.completed_devices += 1
                        }
                        Some(DeviceResult::Failed) => stats.failed_devices += 1,
                        None => stats.failed_devices += 1,
                    }
                }
                _ => stats.pending_devices += 1,
            }
        }

        for stats in self.country_stats.values_mut() {
            stats.device_percent = percent(stats.completed_devices, stats.total_devices);
            stats.command_percent = percent(stats.completed_commands, stats.total_commands);
            stats.percent = stats.command_percent;

            if let Some(start) = stats.start_time {
                stats.elapsed_seconds = (now - start).num_milliseconds() as f64 / 1000.0;
            }

            if stats.total_devices > 0
                && stats.completed_devices + stats.failed_devices == stats.total_devices
                && stats.end_time.is_none()
                && stats.start_time.is_some()
            {
                stats.end_time = Some(now);
            }
        }
    }
}

fn percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as u64 * 100) / total as u64) as u8
}
