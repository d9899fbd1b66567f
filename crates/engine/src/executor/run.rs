//! Run: one full invocation of a workflow definition.
//!
//! A run owns its jobs plus the shared scratch areas: a stage directory
//! (build area for the whole run), a bin directory (resolved helper
//! executables), and the context-directory root that jobs and steps nest
//! under. All three live under `<workspace>/<run-id>/`.

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{info, warn};

use runlet_types::WorkflowDefinition;

use crate::error::EngineError;
use crate::executor::job::Job;
use crate::executor::manager::ManagerConfig;
use crate::spawn::ProcessSpawner;
use crate::state::{LifecycleState, Status, short_id};

/// The scratch directories owned by one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Shared scratch/build area for the whole run (read/write for steps).
    pub stage_dir: PathBuf,
    /// Resolved helper executables (write for steps).
    pub bin_dir: PathBuf,
    /// Root under which job and step context directories nest.
    pub context_dir: PathBuf,
}

/// One workflow invocation.
pub struct Run {
    id: String,
    jobs: Vec<Job>,
    paths: RunPaths,
    state: LifecycleState,
}

impl Run {
    /// Creates a pending run and its jobs from a workflow definition.
    pub fn new(def: &WorkflowDefinition, config: &ManagerConfig) -> Self {
        let id = short_id("run");
        let root = config.workspace_dir.join(&id);
        Self {
            jobs: def.jobs.iter().map(|(name, job_def)| Job::new(name, job_def)).collect(),
            paths: RunPaths {
                stage_dir: root.join("stage"),
                bin_dir: root.join("bin"),
                context_dir: root.join("context"),
            },
            id,
            state: LifecycleState::new(),
        }
    }

    /// Generated process-unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Aggregated result message.
    pub fn result(&self) -> &str {
        self.state.result()
    }

    /// The run's jobs in declaration order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// The run's scratch directories.
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Exit code the overall command should mirror: the first failed step's
    /// recorded subprocess exit code, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        self.jobs
            .iter()
            .flat_map(Job::steps)
            .find(|step| step.status() == Status::Failed)
            .and_then(|step| step.state().exit_code())
            .unwrap_or(0)
    }

    /// Snapshot of the lifecycle state merged with per-job snapshots.
    pub fn combined_state(&self) -> Value {
        let mut snapshot: Map<String, Value> = self.state.combined_state();
        snapshot.insert("id".into(), json!(self.id));
        snapshot.insert(
            "jobs".into(),
            Value::Array(self.jobs.iter().map(Job::combined_state).collect()),
        );
        Value::Object(snapshot)
    }

    /// Creates the stage/bin/context directories and prepares every job.
    ///
    /// A preparation failure does not propagate: the run is marked `skipped`
    /// (validation failed before any job started) and `execute()` is never
    /// reached by the manager, which only continues while the run is pending.
    pub async fn prepare(&mut self, config: &ManagerConfig) -> Result<(), EngineError> {
        if let Err(error) = self.prepare_inner(config).await {
            warn!(run_id = %self.id, error = %error, "run preparation failed");
            self.state.skip(format!("Run preparation failed: {error}"))?;
        }
        Ok(())
    }

    async fn prepare_inner(&mut self, config: &ManagerConfig) -> Result<(), EngineError> {
        fs::create_dir_all(&self.paths.stage_dir).await?;
        fs::create_dir_all(&self.paths.bin_dir).await?;
        fs::create_dir_all(&self.paths.context_dir).await?;
        for job in &mut self.jobs {
            job.prepare(&self.paths.context_dir, config).await?;
        }
        Ok(())
    }

    /// Runs every job in declaration order and aggregates the outcome.
    ///
    /// Jobs carry no dependency edges, so later jobs still run after a
    /// failure; the run ends failed if any job failed.
    pub async fn execute(&mut self, spawner: &dyn ProcessSpawner, config: &ManagerConfig) -> Result<(), EngineError> {
        self.state.start()?;
        info!(run_id = %self.id, job_count = self.jobs.len(), "run execution started");

        for job in &mut self.jobs {
            job.execute(&self.paths, spawner, config).await?;
        }

        let failed_job = self.jobs.iter().find(|job| job.status() == Status::Failed);
        match failed_job {
            Some(job) => {
                let message = format!("Job {} failed", job.name());
                self.state.fail(message)?;
            }
            None => self.state.succeed()?,
        }
        self.state.stop();
        info!(run_id = %self.id, status = %self.state.status(), "run execution finished");
        Ok(())
    }
}
