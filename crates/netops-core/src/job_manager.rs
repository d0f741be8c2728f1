use crate::broadcast::{EventKind, JobEvent, ProgressBroadcaster};
use crate::device::Device;
use crate::error::NetopsError;
use crate::job::{
    CommandProgress, CommandStatus, CurrentDevice, DeviceProgress, DeviceResult, DeviceRunResult,
    DeviceStatus, Job, JobStatus,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Holds every job behind one mutex and owns the broadcast of state
/// snapshots.
///
/// Every public mutator acquires the lock, mutates, recomputes the derived
/// aggregates and takes a snapshot; the broadcast itself happens after the
/// lock is released, so a slow subscriber can never stall a worker.
pub struct JobManager {
    jobs: Mutex<HashMap<String, Job>>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl JobManager {
    pub fn new(broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    fn publish(&self, kind: EventKind, snapshot: Job) {
        self.broadcaster.publish(JobEvent {
            kind,
            job_id: snapshot.id.clone(),
            snapshot,
        });
    }

    /// Mutate one job under the lock, then broadcast exactly one snapshot.
    fn with_job<F>(&self, job_id: &str, kind: EventKind, mutate: F)
    where
        F: FnOnce(&mut Job),
    {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(job_id) else {
                warn!(job_id, "Ignoring update for unknown job");
                return;
            };
            mutate(job);
            job.recompute_country_stats();
            job.clone()
        };
        self.publish(kind, snapshot);
    }

    /// Create a job for `devices`; all devices start pending.
    pub fn create_job(&self, devices: &[Device]) -> String {
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new(job_id.clone(), devices);
        info!(job_id = %job_id, devices = devices.len(), "Job created");

        let snapshot = {
            let mut jobs = self.jobs.lock();
            jobs.insert(job_id.clone(), job.clone());
            job
        };
        self.publish(EventKind::JobCreated, snapshot);
        job_id
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().get(job_id).cloned()
    }

    pub fn get_latest_job(&self) -> Option<Job> {
        self.jobs
            .lock()
            .values()
            .max_by_key(|job| job.start_time)
            .cloned()
    }

    pub fn set_execution_id(&self, job_id: &str, execution_id: &str) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(job_id) {
            job.execution_id = Some(execution_id.to_string());
        }
    }

    /// Record the command list for one device, updating the country totals.
    pub fn init_device_commands(&self, job_id: &str, device_id: &str, commands: &[String]) {
        self.with_job(job_id, EventKind::CommandUpdate, |job| {
            let Some(progress) = job.device_progress.get_mut(device_id) else {
                return;
            };
            progress.total_commands = commands.len() as u32;
            progress.commands = commands.iter().map(|c| CommandProgress::pending(c)).collect();

            if let Some(stats) = job.country_stats.get_mut(&progress.country) {
                stats.total_commands += commands.len() as u32;
            }
        });
    }

    /// Move a device through its lifecycle, maintaining `current_device`.
    pub fn update_device_status(
        &self,
        job_id: &str,
        device_id: &str,
        status: DeviceStatus,
        error: Option<String>,
    ) {
        debug!(job_id, device_id, ?status, "Device status update");
        self.with_job(job_id, EventKind::DeviceStatusUpdate, |job| {
            let Some(progress) = job.device_progress.get_mut(device_id) else {
                return;
            };
            progress.status = status;
            if let Some(error) = error {
                progress.errors.push(error);
            }

            match status {
                DeviceStatus::Connecting | DeviceStatus::Connected | DeviceStatus::Executing => {
                    job.current_device = Some(CurrentDevice {
                        device_id: device_id.to_string(),
                        device_name: progress.device_name.clone(),
                        country: progress.country.clone(),
                        status: Some(status),
                        current_command: None,
                        command_index: None,
                        total_commands: None,
                    });
                }
                DeviceStatus::Completed
                | DeviceStatus::Failed
                | DeviceStatus::ConnectionFailed
                | DeviceStatus::Disconnected => {
                    let is_current = job
                        .current_device
                        .as_ref()
                        .is_some_and(|c| c.device_id == device_id);
                    if is_current {
                        job.current_device = None;
                    }
                }
                _ => {}
            }
        });
    }

    /// Publish which command is currently in flight.
    pub fn update_current_execution(&self, job_id: &str, current: CurrentDevice) {
        self.with_job(job_id, EventKind::ExecutionUpdate, |job| {
            job.current_device = Some(current);
        });
    }

    /// Write one command row. Success and failure bump the completed
    /// counters; success pins the command percent at 100.
    pub fn update_device_command_status(
        &self,
        job_id: &str,
        device_id: &str,
        command_index: usize,
        status: CommandStatus,
        execution_time: Option<f64>,
        error: Option<String>,
    ) {
        self.with_job(job_id, EventKind::CommandUpdate, |job| {
            let Some(progress) = job.device_progress.get_mut(device_id) else {
                return;
            };

            if let Some(cmd) = progress.commands.get_mut(command_index) {
                cmd.status = status;
                cmd.percent = match status {
                    CommandStatus::Success => 100,
                    _ => 0,
                };
                if execution_time.is_some() {
                    cmd.execution_time = execution_time;
                }
                if error.is_some() {
                    cmd.error = error;
                }
            }

            if matches!(status, CommandStatus::Success | CommandStatus::Failed) {
                progress.completed_commands += 1;
                if let Some(stats) = job.country_stats.get_mut(&progress.country) {
                    stats.completed_commands += 1;
                }
            }

            if status == CommandStatus::Running {
                progress.status = DeviceStatus::Executing;
            }

            if progress.total_commands > 0 {
                progress.percent =
                    ((progress.completed_commands as u64 * 100) / progress.total_commands as u64) as u8;
            }
        });
    }

    /// Record a finished device and advance the job; the job completes when
    /// the last device reports in.
    pub fn update_job_progress(&self, job_id: &str, device_id: &str, result: DeviceRunResult) {
        let (snapshot, kind) = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(job_id) else {
                warn!(job_id, "Ignoring progress for unknown job");
                return;
            };

            job.completed_devices += 1;
            job.recompute_progress();

            if let Some(progress) = job.device_progress.get_mut(device_id) {
                progress.result = Some(result.status);
                progress.status = match result.status {
                    DeviceResult::Failed => DeviceStatus::Failed,
                    _ => DeviceStatus::Completed,
                };
            }
            job.results.insert(device_id.to_string(), result);

            let kind = if job.completed_devices >= job.total_devices {
                job.status = JobStatus::Completed;
                job.end_time = Some(Utc::now());
                job.current_device = None;
                info!(job_id, "Job completed");
                EventKind::JobCompleted
            } else {
                EventKind::ProgressUpdate
            };

            job.recompute_country_stats();
            (job.clone(), kind)
        };
        self.publish(kind, snapshot);
    }

    /// Request a cooperative stop. Idempotent; only running jobs move to
    /// stopping.
    pub fn stop_job(&self, job_id: &str) {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            if job.status != JobStatus::Running {
                return;
            }
            job.stop_requested = true;
            job.status = JobStatus::Stopping;
            info!(job_id, "Stop requested");
            job.clone()
        };
        self.publish(EventKind::JobStopping, snapshot);
    }

    pub fn is_stop_requested(&self, job_id: &str) -> bool {
        self.jobs
            .lock()
            .get(job_id)
            .map(|job| job.stop_requested)
            .unwrap_or(false)
    }

    /// Terminal completion for a run that was cancelled cleanly: the devices
    /// processed so far stand, the rest never started.
    pub fn finish_job(&self, job_id: &str) {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Completed;
            job.end_time = Some(Utc::now());
            job.current_device = None;
            job.recompute_country_stats();
            info!(job_id, "Job finished after cancellation");
            job.clone()
        };
        self.publish(EventKind::JobCompleted, snapshot);
    }

    /// Terminal failure.
    pub fn fail_job(&self, job_id: &str, error: &str) {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            if job.status.is_terminal() {
                return;
            }
            job.status = JobStatus::Failed;
            job.errors.push(error.to_string());
            job.end_time = Some(Utc::now());
            job.current_device = None;
            job.recompute_country_stats();
            warn!(job_id, error, "Job failed");
            job.clone()
        };
        self.publish(EventKind::JobFailed, snapshot);
    }

    pub fn job_exists(&self, job_id: &str) -> Result<(), NetopsError> {
        if self.jobs.lock().contains_key(job_id) {
            Ok(())
        } else {
            Err(NetopsError::JobNotFound(job_id.to_string()))
        }
    }
}
