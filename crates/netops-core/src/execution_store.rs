use crate::error::NetopsError;
use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TEXT_DIR: &str = "TEXT";
pub const JSON_DIR: &str = "JSON";
pub const METADATA_FILE: &str = "metadata.json";
pub const CURRENT_POINTER: &str = "current";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

lazy_static! {
    static ref FILE_TIMESTAMP: Regex =
        Regex::new(r"(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})").unwrap();
}

/// Layout of one execution directory.
#[derive(Debug, Clone)]
pub struct ExecutionPaths {
    pub execution_id: String,
    pub dir: PathBuf,
    pub text_dir: PathBuf,
    pub json_dir: PathBuf,
}

impl ExecutionPaths {
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }
}

/// Per-execution directory layout rooted at `executions/`.
///
/// Artifacts are write-once; the only mutable element is the `current`
/// pointer naming the latest successful execution, updated atomically
/// against readers (remove-then-create symlink).
pub struct ExecutionStore {
    root: PathBuf,
}

impl ExecutionStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, NetopsError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `executions/<execution_id>/{TEXT,JSON}`.
    pub fn create_execution(&self, execution_id: &str) -> Result<ExecutionPaths, NetopsError> {
        let dir = self.root.join(execution_id);
        let text_dir = dir.join(TEXT_DIR);
        let json_dir = dir.join(JSON_DIR);
        fs::create_dir_all(&text_dir)?;
        fs::create_dir_all(&json_dir)?;
        info!(execution_id, "Created execution directory {}", dir.display());
        Ok(ExecutionPaths {
            execution_id: execution_id.to_string(),
            dir,
            text_dir,
            json_dir,
        })
    }

    pub fn execution_paths(&self, execution_id: &str) -> ExecutionPaths {
        let dir = self.root.join(execution_id);
        ExecutionPaths {
            execution_id: execution_id.to_string(),
            dir: dir.clone(),
            text_dir: dir.join(TEXT_DIR),
            json_dir: dir.join(JSON_DIR),
        }
    }

    /// Write `metadata.json` for an execution (atomic).
    pub fn write_metadata(
        &self,
        paths: &ExecutionPaths,
        metadata: &Value,
    ) -> Result<(), NetopsError> {
        let raw = serde_json::to_vec_pretty(metadata)?;
        atomic_write(&paths.metadata_path(), &raw)
    }

    /// Repoint `current` at `execution_id`.
    pub fn point_current(&self, execution_id: &str) -> Result<(), NetopsError> {
        let link = self.root.join(CURRENT_POINTER);

        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(execution_id, &link)?;
        #[cfg(not(unix))]
        fs::write(&link, execution_id)?;

        info!(execution_id, "Updated 'current' pointer");
        Ok(())
    }

    /// Resolve the `current` pointer to an execution directory, validating
    /// that the TEXT and JSON subdirectories exist.
    pub fn current_execution(&self) -> Option<ExecutionPaths> {
        let link = self.root.join(CURRENT_POINTER);

        let execution_id = match fs::read_link(&link) {
            Ok(target) => target.to_string_lossy().into_owned(),
            Err(_) => fs::read_to_string(&link).ok()?.trim().to_string(),
        };

        let paths = self.execution_paths(&execution_id);
        if paths.text_dir.is_dir() && paths.json_dir.is_dir() {
            debug!(execution_id = %paths.execution_id, "Resolved 'current' execution");
            Some(paths)
        } else {
            warn!(
                execution_id = %paths.execution_id,
                "'current' points at an incomplete execution"
            );
            None
        }
    }
}

/// Write a file atomically: temp file in the same directory, fsync, rename
/// over the destination.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), NetopsError> {
    let dir = path.parent().ok_or_else(|| {
        NetopsError::WriteError(format!("no parent directory for {}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| NetopsError::WriteError(format!("invalid file name {}", path.display())))?;

    let tmp_path = dir.join(format!(".{}.tmp", file_name));
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Slug a command for use in artifact file names: spaces become `_`,
/// slashes become `-`.
pub fn command_slug(command: &str) -> String {
    command.replace(' ', "_").replace('/', "-")
}

/// `<device>_<slug>_<yyyy-mm-dd_HH-MM-SS>` (extension added by the caller).
pub fn artifact_file_stem(device_name: &str, command: &str, timestamp: &NaiveDateTime) -> String {
    format!(
        "{}_{}_{}",
        device_name,
        command_slug(command),
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// A parsed artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub device_name: String,
    pub command_slug: String,
    pub timestamp: NaiveDateTime,
}

/// Parse `<device>_<slug>_<ts>.<ext>` back into its parts.
///
/// The device name is everything before the command slug; collected
/// commands all start with `show` or `terminal`, which anchors the split
/// even when device names themselves contain underscores.
pub fn parse_artifact_file_name(file_name: &str) -> Option<ArtifactName> {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);

    let ts_match = FILE_TIMESTAMP.find(stem)?;
    let timestamp = NaiveDateTime::parse_from_str(ts_match.as_str(), TIMESTAMP_FORMAT).ok()?;

    let before_ts = stem.get(..ts_match.start())?.trim_end_matches('_');

    let split_at = before_ts
        .find("_show_")
        .or_else(|| before_ts.find("_terminal_"))?;
    let device_name = before_ts[..split_at].to_string();
    let command_slug = before_ts[split_at + 1..].to_string();

    Some(ArtifactName {
        device_name,
        command_slug,
        timestamp,
    })
}
