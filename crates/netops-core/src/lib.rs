//! Automation engine for Cisco router fleets.
//!
//! Connects to devices over SSH (optionally through a shared bastion
//! tunnel), runs show-command batteries in rate-limited batches, persists
//! raw and parsed outputs per execution and pushes live progress snapshots
//! to subscribers.

pub mod broadcast;
pub mod channel;
pub mod command_runner;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod execution_store;
pub mod executor;
pub mod job;
pub mod job_manager;
pub mod logging;
pub mod parsers;
pub mod pool;
pub mod session;
pub mod tunnel;
pub mod ws;

// Import lazy_static for the parsing regexes
#[macro_use]
extern crate lazy_static;

// Re-export core types
pub use broadcast::{EventKind, JobEvent, ProgressBroadcaster};
pub use command_runner::{command_timeout, CommandRecord, CommandRunner, RunStatus};
pub use config::{router_credentials, JumphostConfig, JumphostConfigSource};
pub use credentials::{CredentialResolver, ResolvedCredentials};
pub use device::{Device, Dialect};
pub use error::NetopsError;
pub use execution_store::{
    artifact_file_stem, command_slug, parse_artifact_file_name, ArtifactName, ExecutionPaths,
    ExecutionStore,
};
pub use executor::{ExecutorConfig, JobExecutor, OSPF_COMMANDS};
pub use job::{
    CommandProgress, CommandStatus, CountryStats, CurrentDevice, DeviceProgress, DeviceResult,
    DeviceRunResult, DeviceStatus, Job, JobStatus,
};
pub use job_manager::JobManager;
pub use logging::init_logging;
pub use pool::{ConnectionPool, SharedSession};
pub use session::{DeviceSession, SessionParams};
pub use tunnel::BastionTunnel;
