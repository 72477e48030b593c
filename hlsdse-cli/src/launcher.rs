//! Job Launching
//!
//! The dispatcher only sees these traits; `ProcessLauncher` is the
//! implementation that runs the synthesis tool.

use hlsdse_core::DesignPoint;
use hlsdse_report::{ArtifactError, CompletionRecord};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to prepare or run a tool process
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("completion artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("design point directory {0} does not exist")]
    MissingPointDir(PathBuf),

    #[error("tool path cannot be added to PATH: {0}")]
    InvalidToolPath(#[from] std::env::JoinPathsError),

    #[error("tracer for kernel {kernel} failed with {status}")]
    TraceFailed { kernel: String, status: String },
}

/// What a finished job left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Report text, when the job produced one
    pub report: Option<String>,
}

impl JobOutput {
    /// Whether the job exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short description of how the job ended
    pub fn describe_exit(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// A running job
pub trait JobHandle {
    /// Non-blocking liveness check
    fn is_alive(&mut self) -> bool;

    /// Reap the job once `is_alive()` returned false
    fn join(self) -> Result<JobOutput, LaunchError>;
}

/// Starts one job per design point
pub trait JobLauncher {
    /// Handle of a started job
    type Handle: JobHandle;

    /// Clear every slot's persistent cache; called once before dispatch
    fn reset_slot_caches(&mut self, _slots: usize) -> Result<(), LaunchError> {
        Ok(())
    }

    /// Remove stale results and bind the slot's cache to the point
    fn prepare(&mut self, _slot: usize, _point: &DesignPoint) -> Result<(), LaunchError> {
        Ok(())
    }

    /// Start the job without waiting for it
    fn launch(&mut self, slot: usize, point: &DesignPoint) -> Result<Self::Handle, LaunchError>;

    /// Persist the completion artifact of a finished point
    fn record_completion(
        &mut self,
        _code: &str,
        _completion: &CompletionRecord,
    ) -> Result<(), LaunchError> {
        Ok(())
    }
}
