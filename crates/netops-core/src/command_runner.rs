use crate::device::Device;
use crate::error::NetopsError;
use crate::execution_store::{artifact_file_stem, atomic_write, ExecutionPaths};
use crate::parsers;
use crate::pool::SharedSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Dynamic per-command timeouts. Longest-output commands get the most time;
/// the table is matched by command prefix.
const COMMAND_TIMEOUTS: &[(&str, u64)] = &[
    ("show running-config", 180),
    ("show ospf database", 120),
    ("show interface", 120),
    ("show cdp neighbor detail", 90),
    ("terminal length 0", 10),
];

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Timeout for one command, prefix-matched against the policy table.
pub fn command_timeout(command: &str) -> Duration {
    let cmd = command.trim().to_lowercase();
    for (prefix, secs) in COMMAND_TIMEOUTS {
        if cmd.starts_with(prefix) {
            return Duration::from_secs(*secs);
        }
    }
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// Outcome of one command execution, including where its artifacts landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub device_id: String,
    pub device_name: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandRecord {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Executes single commands against a connected session and persists the
/// raw and parsed outputs into one execution's directories.
pub struct CommandRunner {
    paths: ExecutionPaths,
}

impl CommandRunner {
    pub fn new(paths: ExecutionPaths) -> Self {
        Self { paths }
    }

    /// Run `command` on `session`.
    ///
    /// Device-side error text still counts as success; only transport,
    /// timeout and artifact-write failures produce an error record.
    pub fn run(&self, session: &SharedSession, device: &Device, command: &str) -> CommandRecord {
        info!(device = %device.name, command, "Executing command");

        let timeout = command_timeout(command);
        let started_at = Utc::now();
        let clock = Instant::now();

        let output = {
            let mut session = session.lock();
            session.send_command(command, timeout)
        };
        let execution_time = clock.elapsed().as_secs_f64();

        match output {
            Ok(output) => {
                let filename =
                    match self.persist(device, command, &output, &started_at, execution_time) {
                        Ok(filename) => filename,
                        Err(e) => {
                            warn!(device = %device.name, command, "Artifact write failed: {}", e);
                            return CommandRecord {
                                command: command.to_string(),
                                device_id: device.id.clone(),
                                device_name: device.name.clone(),
                                status: RunStatus::Error,
                                output: Some(output),
                                error: Some(format!("failed to persist output: {}", e)),
                                execution_time_seconds: execution_time,
                                filename: None,
                                timestamp: started_at,
                            };
                        }
                    };

                info!(
                    device = %device.name,
                    command,
                    "Command executed in {:.2}s, output saved to {}",
                    execution_time,
                    filename
                );

                CommandRecord {
                    command: command.to_string(),
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    status: RunStatus::Success,
                    output: Some(output),
                    error: None,
                    execution_time_seconds: execution_time,
                    filename: Some(filename),
                    timestamp: started_at,
                }
            }
            Err(e) => {
                warn!(device = %device.name, command, "Command failed: {}", e);
                CommandRecord {
                    command: command.to_string(),
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    status: RunStatus::Error,
                    output: None,
                    error: Some(e.to_string()),
                    execution_time_seconds: execution_time,
                    filename: None,
                    timestamp: started_at,
                }
            }
        }
    }

    /// Write the TEXT and JSON artifacts for one command.
    fn persist(
        &self,
        device: &Device,
        command: &str,
        output: &str,
        started_at: &DateTime<Utc>,
        execution_time: f64,
    ) -> Result<String, NetopsError> {
        let stem = artifact_file_stem(&device.name, command, &started_at.naive_utc());

        let text_name = format!("{}.txt", stem);
        let banner = format!(
            "# Command: {}\n# Device: {} ({})\n# Timestamp: {}\n# Execution Time: {:.2}s\n#{}\n\n",
            command,
            device.name,
            device.id,
            started_at.to_rfc3339(),
            execution_time,
            "=".repeat(78),
        );
        let mut text_contents = banner.into_bytes();
        text_contents.extend_from_slice(output.as_bytes());
        atomic_write(&self.paths.text_dir.join(&text_name), &text_contents)?;

        let json_name = format!("{}.json", stem);
        let record = json!({
            "command": command,
            "device_id": device.id,
            "device_name": device.name,
            "timestamp": started_at.to_rfc3339(),
            "execution_time_seconds": execution_time,
            "parsed_data": parsers::parse_output(command, output),
            "raw_output": output,
        });
        atomic_write(
            &self.paths.json_dir.join(&json_name),
            &serde_json::to_vec_pretty(&record)?,
        )?;
        debug!(device = %device.name, "JSON saved to {}", json_name);

        Ok(text_name)
    }
}
