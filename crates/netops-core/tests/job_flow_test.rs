//! End-to-end job flow against unreachable devices.
//!
//! No live SSH: every device address points at a closed port, so connects
//! fail fast and the job machinery (batching, progress, cancellation,
//! metadata, the `current` pointer) can be exercised for real.

use netops_core::{
    BastionTunnel, ConnectionPool, Device, DeviceStatus, EventKind, ExecutionStore,
    ExecutorConfig, JobExecutor, JobManager, JobStatus, JumphostConfig, JumphostConfigSource,
    ProgressBroadcaster,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn unreachable_device(id: &str, name: &str) -> Device {
    Device {
        id: id.to_string(),
        name: name.to_string(),
        // Discard port; nothing listens there
        address: "127.0.0.1".to_string(),
        port: 9,
        country: None,
        software: Some("IOS-XR".to_string()),
        platform: None,
    }
}

struct Harness {
    executor: Arc<JobExecutor>,
    manager: Arc<JobManager>,
    store: Arc<ExecutionStore>,
    _dir: TempDir,
}

fn harness(jumphost: JumphostConfig) -> Harness {
    // First caller installs the subscriber, the rest are told no
    let _ = netops_core::init_logging("warn", None);

    let dir = TempDir::new().unwrap();
    let config_source = Arc::new(JumphostConfigSource::new(
        dir.path().join("jumphost_config.json"),
    ));
    config_source.save(&jumphost).unwrap();

    let broadcaster = Arc::new(ProgressBroadcaster::new());
    let manager = Arc::new(JobManager::new(broadcaster));
    let tunnel = Arc::new(BastionTunnel::new(Arc::clone(&config_source)));
    let pool = Arc::new(ConnectionPool::new(config_source, tunnel));
    let store = Arc::new(ExecutionStore::new(dir.path().join("executions")).unwrap());

    let executor = Arc::new(JobExecutor::new(
        Arc::clone(&manager),
        pool,
        Arc::clone(&store),
        ExecutorConfig::default(),
    ));

    Harness {
        executor,
        manager,
        store,
        _dir: dir,
    }
}

async fn wait_for_terminal(manager: &JobManager, job_id: &str, timeout: Duration) -> JobStatus {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(job) = manager.get_job(job_id) {
            if job.status.is_terminal() {
                return job.status;
            }
        }
        assert!(
            std::time::Instant::now() < deadline,
            "job {} did not reach a terminal state in time",
            job_id
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_devices_fail_but_the_job_completes() {
    let h = harness(JumphostConfig::default());
    let devices = vec![
        unreachable_device("d1", "deu-r1"),
        unreachable_device("d2", "deu-r2"),
    ];

    let job_id = h
        .executor
        .start(devices, Some(vec!["show version".to_string()]), 10, 0)
        .unwrap();

    let status = wait_for_terminal(&h.manager, &job_id, Duration::from_secs(60)).await;
    assert_eq!(status, JobStatus::Completed);

    let job = h.manager.get_job(&job_id).unwrap();
    assert_eq!(job.completed_devices, 2);
    assert_eq!(job.progress_percent, 100);
    for progress in job.device_progress.values() {
        assert_eq!(progress.status, DeviceStatus::Failed);
        assert!(!progress.errors.is_empty());
    }
    assert_eq!(job.country_stats["DEU"].failed_devices, 2);

    // Final metadata and the current pointer landed on disk
    let current = h.store.current_execution().expect("current pointer set");
    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(current.metadata_path()).unwrap()).unwrap();
    assert_eq!(metadata["job_id"], job_id);
    assert_eq!(metadata["status"], "completed");
    assert_eq!(metadata["results"]["total_devices"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_between_batches_skips_the_rest() {
    let h = harness(JumphostConfig::default());
    let devices = vec![
        unreachable_device("d1", "deu-r1"),
        unreachable_device("d2", "deu-r2"),
    ];
    let broadcaster = Arc::clone(h.manager.broadcaster());
    let mut rx = broadcaster.subscribe();

    // batch_size 1 at 1 device/hour: a 3600s pause between batches that
    // only cancellation can cut short
    let job_id = h
        .executor
        .start(devices, Some(vec!["show version".to_string()]), 1, 1)
        .unwrap();

    // Wait for batch 1 to finish, then stop during the inter-batch sleep
    let deadline = std::time::Instant::now() + Duration::from_secs(60);
    loop {
        if let Some(job) = h.manager.get_job(&job_id) {
            if job.completed_devices >= 1 {
                break;
            }
        }
        assert!(std::time::Instant::now() < deadline, "batch 1 never finished");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    h.manager.stop_job(&job_id);

    // The sleep is interruptible within about a second
    let status = wait_for_terminal(&h.manager, &job_id, Duration::from_secs(15)).await;
    assert_eq!(status, JobStatus::Completed);

    let job = h.manager.get_job(&job_id).unwrap();
    assert_eq!(job.completed_devices, 1);
    // Batch 2 never started
    assert_eq!(job.device_progress["d2"].status, DeviceStatus::Pending);

    // Subscribers saw job_stopping followed by a terminal event
    let mut saw_stopping = false;
    let mut saw_terminal_after_stopping = false;
    while let Ok(event) = rx.try_recv() {
        match event.kind {
            EventKind::JobStopping => saw_stopping = true,
            EventKind::JobCompleted if saw_stopping => saw_terminal_after_stopping = true,
            _ => {}
        }
    }
    assert!(saw_stopping);
    assert!(saw_terminal_after_stopping);

    // Metadata reflects the terminal state
    let current = h.store.current_execution().expect("current pointer set");
    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(current.metadata_path()).unwrap()).unwrap();
    assert_eq!(metadata["status"], "completed");
}

#[tokio::test(flavor = "multi_thread")]
async fn bastion_required_means_no_direct_connect_fallback() {
    // Jumphost enabled but unreachable: every device must fail through the
    // tunnel, never directly
    let h = harness(JumphostConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port: 9,
        username: "jump".to_string(),
        password: "jumppass".to_string(),
    });
    let devices = vec![
        unreachable_device("d1", "deu-r1"),
        unreachable_device("d2", "deu-r2"),
    ];

    let job_id = h
        .executor
        .start(devices, Some(vec!["show version".to_string()]), 10, 0)
        .unwrap();

    let status = wait_for_terminal(&h.manager, &job_id, Duration::from_secs(120)).await;
    assert_eq!(status, JobStatus::Completed);

    let job = h.manager.get_job(&job_id).unwrap();
    for progress in job.device_progress.values() {
        assert_eq!(progress.status, DeviceStatus::Failed);
        let error = progress.errors.join(" ");
        assert!(
            error.contains("jumphost") || error.contains("tunnel"),
            "error should mention the bastion, got: {}",
            error
        );
    }
    assert!(job
        .results
        .values()
        .all(|r| r.status == netops_core::DeviceResult::Failed));
}
