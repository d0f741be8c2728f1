use crate::command_runner::CommandRunner;
use crate::device::Device;
use crate::error::NetopsError;
use crate::execution_store::{ExecutionPaths, ExecutionStore};
use crate::job::{
    CommandStatus, CurrentDevice, DeviceResult, DeviceRunResult, DeviceStatus,
};
use crate::job_manager::JobManager;
use crate::parsers::{parse_cpu, parse_memory};
use crate::pool::ConnectionPool;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Standard OSPF data collection battery, used when the caller supplies no
/// command list.
pub const OSPF_COMMANDS: &[&str] = &[
    "terminal length 0",
    "show process cpu",
    "show process memory",
    "show route connected",
    "show route ospf",
    "show ospf database",
    "show ospf database self-originate",
    "show ospf database router",
    "show ospf database network",
    "show ospf interface brief",
    "show ospf neighbor",
    "show running-config router ospf",
    "show cdp neighbor",
    "show cdp neighbor detail",
    "show interface description",
    "show interface brief",
    "show ipv4 interface brief",
    "show interface",
    "show bundle",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BATCH_WORKERS: usize = 10;
const SLEEP_CHUNK: Duration = Duration::from_secs(1);

const HEALTH_CPU_LIMIT: u32 = 70;
const HEALTH_MEMORY_LIMIT_PCT: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Gate collection on a CPU/memory pre-check. Intended for diagnostic
    /// runs against fleets under load; off by default.
    pub health_gate: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { health_gate: false }
    }
}

/// Orchestrates one automation job: batching, rate-limited pacing, a
/// bounded per-batch worker pool and unconditional disconnect after every
/// batch.
pub struct JobExecutor {
    manager: Arc<JobManager>,
    pool: Arc<ConnectionPool>,
    store: Arc<ExecutionStore>,
    config: ExecutorConfig,
}

impl JobExecutor {
    pub fn new(
        manager: Arc<JobManager>,
        pool: Arc<ConnectionPool>,
        store: Arc<ExecutionStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            manager,
            pool,
            store,
            config,
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Create the job and its execution directory, then run the collection
    /// on a detached background task. Returns the job id immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        self: &Arc<Self>,
        devices: Vec<Device>,
        commands: Option<Vec<String>>,
        batch_size: usize,
        devices_per_hour: u32,
    ) -> Result<String, NetopsError> {
        let commands = match commands {
            Some(commands) if !commands.is_empty() => commands,
            _ => OSPF_COMMANDS.iter().map(|c| c.to_string()).collect(),
        };

        let job_id = self.manager.create_job(&devices);
        let execution_id = format!(
            "exec_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &job_id[..8.min(job_id.len())]
        );
        self.manager.set_execution_id(&job_id, &execution_id);
        info!(job_id = %job_id, execution_id = %execution_id, "Created execution");

        let paths = self.store.create_execution(&execution_id)?;
        self.write_initial_metadata(&paths, &job_id, &devices, &commands)?;

        let executor = Arc::clone(self);
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            executor
                .execute(task_job_id, paths, devices, commands, batch_size, devices_per_hour)
                .await;
        });

        Ok(job_id)
    }

    fn write_initial_metadata(
        &self,
        paths: &ExecutionPaths,
        job_id: &str,
        devices: &[Device],
        commands: &[String],
    ) -> Result<(), NetopsError> {
        let metadata = json!({
            "execution_id": paths.execution_id,
            "job_id": job_id,
            "timestamp": Utc::now().to_rfc3339(),
            "status": "running",
            "devices": devices
                .iter()
                .map(|d| json!({ "id": d.id, "name": d.name, "ip": d.address }))
                .collect::<Vec<_>>(),
            "commands": commands,
            "total_devices": devices.len(),
        });
        self.store.write_metadata(paths, &metadata)
    }

    /// The background body of one job.
    async fn execute(
        self: Arc<Self>,
        job_id: String,
        paths: ExecutionPaths,
        devices: Vec<Device>,
        commands: Vec<String>,
        batch_size: usize,
        devices_per_hour: u32,
    ) {
        info!(
            job_id = %job_id,
            devices = devices.len(),
            batch_size,
            devices_per_hour,
            "Starting job execution"
        );

        // batch_size 0 means a single batch over everything
        let effective_batch = if batch_size == 0 {
            devices.len().max(1)
        } else {
            batch_size
        };

        let batch_delay = if devices_per_hour > 0 {
            let secs = (effective_batch as f64 / devices_per_hour as f64) * 3600.0;
            info!(
                job_id = %job_id,
                "Rate limiting active: {}/hr, {:.2}s between batches",
                devices_per_hour,
                secs
            );
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        };

        let batches: Vec<&[Device]> = devices.chunks(effective_batch).collect();
        let batch_count = batches.len();

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            if self.manager.is_stop_requested(&job_id) {
                warn!(job_id = %job_id, "Job stopped by user");
                break;
            }

            info!(
                job_id = %job_id,
                "Processing batch {}/{} with {} devices",
                batch_idx + 1,
                batch_count,
                batch.len()
            );
            self.process_batch(&job_id, &paths, batch, &commands).await;

            // Pace the fan-out; the sleep is interruptible within a second.
            if batch_idx < batch_count - 1 && !batch_delay.is_zero() {
                debug!(job_id = %job_id, "Waiting {:?} before next batch", batch_delay);
                let mut slept = Duration::ZERO;
                while slept < batch_delay {
                    if self.manager.is_stop_requested(&job_id) {
                        break;
                    }
                    tokio::time::sleep(SLEEP_CHUNK).await;
                    slept += SLEEP_CHUNK;
                }
            }
        }

        self.finalize(&job_id, &paths, &devices, &commands);
    }

    /// Final metadata, `current` pointer and terminal state. Runs on every
    /// exit path, including cancellation.
    fn finalize(&self, job_id: &str, paths: &ExecutionPaths, devices: &[Device], commands: &[String]) {
        if self.manager.is_stop_requested(job_id) {
            self.manager.finish_job(job_id);
        }

        let Some(mut job) = self.manager.get_job(job_id) else {
            return;
        };

        // An empty inventory never passes through update_job_progress
        if !job.status.is_terminal() && job.completed_devices >= job.total_devices {
            self.manager.finish_job(job_id);
            if let Some(finished) = self.manager.get_job(job_id) {
                job = finished;
            }
        }

        let metadata = json!({
            "execution_id": paths.execution_id,
            "job_id": job_id,
            "timestamp": Utc::now().to_rfc3339(),
            "start_time": job.start_time.to_rfc3339(),
            "end_time": job.end_time.map(|t| t.to_rfc3339()),
            "status": job.status,
            "devices": devices
                .iter()
                .map(|d| json!({ "id": d.id, "name": d.name, "ip": d.address }))
                .collect::<Vec<_>>(),
            "commands": commands,
            "results": {
                "total_devices": job.total_devices,
                "completed_devices": job.completed_devices,
                "progress_percent": job.progress_percent,
            },
            "files": {
                "text_dir": paths.text_dir,
                "json_dir": paths.json_dir,
            },
        });

        if let Err(e) = self.store.write_metadata(paths, &metadata) {
            error!(job_id, "Failed to write final metadata: {}", e);
            self.manager.fail_job(job_id, &format!("metadata write failed: {}", e));
            return;
        }

        if let Err(e) = self.store.point_current(&paths.execution_id) {
            error!(job_id, "Failed to update 'current' pointer: {}", e);
            self.manager
                .fail_job(job_id, &format!("current pointer update failed: {}", e));
            return;
        }

        info!(
            job_id,
            execution_id = %paths.execution_id,
            "Execution complete, data saved to {}",
            paths.dir.display()
        );
    }

    /// Fan one batch out over a bounded worker pool, then disconnect every
    /// device in the batch regardless of outcome.
    async fn process_batch(
        &self,
        job_id: &str,
        paths: &ExecutionPaths,
        batch: &[Device],
        commands: &[String],
    ) {
        let max_workers = MAX_BATCH_WORKERS.min(batch.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut handles = Vec::with_capacity(batch.len());

        for device in batch.iter().cloned() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };

            let manager = Arc::clone(&self.manager);
            let pool = Arc::clone(&self.pool);
            let runner = CommandRunner::new(paths.clone());
            let job_id = job_id.to_string();
            let commands = commands.to_vec();
            let health_gate = self.config.health_gate;

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                process_device(&manager, &pool, &runner, &job_id, &device, &commands, health_gate);
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(job_id, "Device worker panicked: {}", e);
            }
        }

        // Never leave devices connected across batches.
        info!(job_id, "Disconnecting {} devices from batch", batch.len());
        for device in batch {
            if self.pool.is_connected(&device.id) {
                self.manager.update_device_status(
                    job_id,
                    &device.id,
                    DeviceStatus::Disconnecting,
                    None,
                );
                if let Err(e) = self.pool.disconnect(&device.id) {
                    warn!(device = %device.name, "Disconnect error: {}", e);
                }
                self.manager.update_device_status(
                    job_id,
                    &device.id,
                    DeviceStatus::Disconnected,
                    None,
                );
            }
        }
    }
}

/// Sequential per-device procedure: connect, optional health gate, run every
/// command, aggregate. Runs on a blocking worker thread.
fn process_device(
    manager: &JobManager,
    pool: &ConnectionPool,
    runner: &CommandRunner,
    job_id: &str,
    device: &Device,
    commands: &[String],
    health_gate: bool,
) {
    if manager.is_stop_requested(job_id) {
        return;
    }

    // Lazy connection: connect on demand
    let session = if let Some(session) = pool.get(&device.id) {
        session
    } else {
        info!(device = %device.name, "Connecting on demand");
        manager.update_device_status(job_id, &device.id, DeviceStatus::Connecting, None);

        match pool.connect(device, CONNECT_TIMEOUT) {
            Ok(session) => {
                manager.update_device_status(job_id, &device.id, DeviceStatus::Connected, None);
                session
            }
            Err(e) => {
                error!(device = %device.name, "Connection failed: {}", e);
                manager.update_device_status(
                    job_id,
                    &device.id,
                    DeviceStatus::ConnectionFailed,
                    Some(e.to_string()),
                );
                manager.update_job_progress(
                    job_id,
                    &device.id,
                    DeviceRunResult {
                        device_id: device.id.clone(),
                        device_name: device.name.clone(),
                        status: DeviceResult::Failed,
                        error: Some(format!("Connection failed: {}", e)),
                        summary: None,
                    },
                );
                return;
            }
        }
    };

    if health_gate {
        if let Err(reason) = check_device_health(runner, &session, device) {
            warn!(device = %device.name, "Health gate failed: {}", reason);
            manager.update_device_status(job_id, &device.id, DeviceStatus::Failed, Some(reason.clone()));
            manager.update_job_progress(
                job_id,
                &device.id,
                DeviceRunResult {
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    status: DeviceResult::Failed,
                    error: Some(reason),
                    summary: None,
                },
            );
            return;
        }
    }

    manager.init_device_commands(job_id, &device.id, commands);

    let mut success_count = 0u32;
    let mut error_count = 0u32;
    let mut last_error = None;

    for (index, command) in commands.iter().enumerate() {
        // An in-flight command always completes; stop lands between commands
        if manager.is_stop_requested(job_id) {
            break;
        }

        manager.update_current_execution(
            job_id,
            CurrentDevice {
                device_id: device.id.clone(),
                device_name: device.name.clone(),
                country: device.country_bucket(),
                status: Some(DeviceStatus::Executing),
                current_command: Some(command.clone()),
                command_index: Some(index as u32 + 1),
                total_commands: Some(commands.len() as u32),
            },
        );
        manager.update_device_command_status(
            job_id,
            &device.id,
            index,
            CommandStatus::Running,
            None,
            None,
        );

        let record = runner.run(&session, device, command);

        if record.is_success() {
            success_count += 1;
            manager.update_device_command_status(
                job_id,
                &device.id,
                index,
                CommandStatus::Success,
                Some(record.execution_time_seconds),
                None,
            );
        } else {
            // Keep going: one failed command does not abort the device
            error_count += 1;
            last_error = record.error.clone();
            manager.update_device_command_status(
                job_id,
                &device.id,
                index,
                CommandStatus::Failed,
                Some(record.execution_time_seconds),
                record.error,
            );
        }
    }

    let status = aggregate_device_result(success_count, error_count);

    manager.update_job_progress(
        job_id,
        &device.id,
        DeviceRunResult {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            status,
            error: last_error,
            summary: Some(format!(
                "{}/{} commands success",
                success_count,
                commands.len()
            )),
        },
    );
}

/// CPU and memory pre-check. Returns the failure reason when the device is
/// too loaded to collect from.
fn check_device_health(
    runner: &CommandRunner,
    session: &crate::pool::SharedSession,
    device: &Device,
) -> Result<(), String> {
    let cpu_record = runner.run(session, device, "show process cpu");
    if !cpu_record.is_success() {
        return Err(format!(
            "Failed to check CPU: {}",
            cpu_record.error.unwrap_or_default()
        ));
    }
    if let Some(cpu) = cpu_record.output.as_deref().and_then(parse_cpu) {
        if cpu.cpu_1min > HEALTH_CPU_LIMIT {
            return Err(format!(
                "High CPU usage: {}% (>{}%)",
                cpu.cpu_1min, HEALTH_CPU_LIMIT
            ));
        }
    }

    let mem_record = runner.run(session, device, "show process memory");
    if !mem_record.is_success() {
        return Err(format!(
            "Failed to check memory: {}",
            mem_record.error.unwrap_or_default()
        ));
    }
    if let Some(memory) = mem_record.output.as_deref().and_then(parse_memory) {
        let used = memory.used_percent();
        if used > HEALTH_MEMORY_LIMIT_PCT {
            return Err(format!(
                "High memory usage: {:.1}% (>{:.0}%)",
                used, HEALTH_MEMORY_LIMIT_PCT
            ));
        }
    }

    Ok(())
}

/// Batch pacing delay: time to process `batch_size` devices at
/// `devices_per_hour`, in seconds.
pub fn batch_delay_seconds(batch_size: usize, devices_per_hour: u32) -> f64 {
    if devices_per_hour == 0 {
        return 0.0;
    }
    (batch_size as f64 / devices_per_hour as f64) * 3600.0
}

/// Aggregate device outcome from per-command counts.
pub fn aggregate_device_result(success_count: u32, error_count: u32) -> DeviceResult {
    if error_count == 0 {
        DeviceResult::Success
    } else if success_count > 0 {
        DeviceResult::PartialSuccess
    } else {
        DeviceResult::Failed
    }
}
