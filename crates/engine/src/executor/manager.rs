//! Manager: the process-wide entry point.
//!
//! Built once from explicit configuration (no ambient environment lookups
//! inside the core), the manager owns the workspace root and the registry of
//! runs. `execute_definition` is the only mutation path for the registry;
//! callers must serialize `cleanup` against active runs themselves.

use std::path::PathBuf;

use indexmap::IndexMap;
use tokio::fs;
use tracing::info;

use runlet_types::WorkflowDefinition;

use crate::error::EngineError;
use crate::executor::run::Run;
use crate::spawn::{DenoSpawner, ProcessSpawner};
use crate::state::Status;

/// Environment variable naming the workspace root directory.
pub const WORKSPACE_DIR_VAR: &str = "RUNLET_WORKSPACE_DIR";

/// Environment variable naming the uid subprocesses run as.
pub const EXECUTION_UID_VAR: &str = "RUNLET_EXECUTION_UID";

/// Environment variable naming the gid subprocesses run as.
pub const EXECUTION_GID_VAR: &str = "RUNLET_EXECUTION_GID";

/// Environment variable overriding the standard-actions base location.
pub const STD_ACTIONS_PREFIX_VAR: &str = "RUNLET_STD_ACTIONS_PREFIX";

/// Base location under which built-in actions are addressed by default.
pub const DEFAULT_STD_ACTIONS_PREFIX: &str = "https://actions.runlet.dev";

/// Process-wide configuration, constructed once at the entry point and passed
/// by reference into runs, jobs, and steps.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root directory all run state lives under. Must already exist.
    pub workspace_dir: PathBuf,
    /// Numeric uid spawned subprocesses run as.
    pub execution_uid: u32,
    /// Numeric gid spawned subprocesses run as.
    pub execution_gid: u32,
    /// Base location for built-in actions.
    pub std_actions_prefix: String,
}

impl ManagerConfig {
    /// Builds the configuration from process environment variables, failing
    /// fast on any missing or invalid value.
    pub fn from_env() -> Result<Self, EngineError> {
        let workspace_dir = required_var(WORKSPACE_DIR_VAR)?;
        let execution_uid = parse_id(EXECUTION_UID_VAR, &required_var(EXECUTION_UID_VAR)?)?;
        let execution_gid = parse_id(EXECUTION_GID_VAR, &required_var(EXECUTION_GID_VAR)?)?;
        let std_actions_prefix =
            std::env::var(STD_ACTIONS_PREFIX_VAR).unwrap_or_else(|_| DEFAULT_STD_ACTIONS_PREFIX.to_string());
        Ok(Self {
            workspace_dir: PathBuf::from(workspace_dir),
            execution_uid,
            execution_gid,
            std_actions_prefix,
        })
    }
}

fn required_var(name: &str) -> Result<String, EngineError> {
    std::env::var(name).map_err(|_| EngineError::Validation(format!("{name} not set")))
}

fn parse_id(name: &str, value: &str) -> Result<u32, EngineError> {
    value
        .parse()
        .map_err(|_| EngineError::Validation(format!("{name} is not a valid numeric id: {value}")))
}

/// Process-wide entry point: owns the workspace root and the run registry.
pub struct Manager {
    config: ManagerConfig,
    spawner: Box<dyn ProcessSpawner>,
    runs: IndexMap<String, Run>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Creates a manager with the production spawner, failing fast when the
    /// workspace root does not exist on disk.
    pub fn new(config: ManagerConfig) -> Result<Self, EngineError> {
        Self::with_spawner(config, Box::new(DenoSpawner::default()))
    }

    /// Creates a manager with an explicit process spawner.
    pub fn with_spawner(config: ManagerConfig, spawner: Box<dyn ProcessSpawner>) -> Result<Self, EngineError> {
        if !config.workspace_dir.is_dir() {
            return Err(EngineError::Validation(format!(
                "workspace dir does not exist: {}",
                config.workspace_dir.display()
            )));
        }
        Ok(Self {
            config,
            spawner,
            runs: IndexMap::new(),
        })
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Registry of runs executed by this manager, in execution order.
    pub fn runs(&self) -> &IndexMap<String, Run> {
        &self.runs
    }

    /// Looks up a run by id.
    pub fn run(&self, id: &str) -> Option<&Run> {
        self.runs.get(id)
    }

    /// Creates a directory under a named root scope. Only the `workspace`
    /// scope is defined.
    pub async fn mkdir(&self, scope: &str, parts: &[&str]) -> Result<PathBuf, EngineError> {
        match scope {
            "workspace" => {
                let mut path = self.config.workspace_dir.clone();
                for part in parts {
                    path.push(part);
                }
                fs::create_dir_all(&path).await?;
                Ok(path)
            }
            other => Err(EngineError::UnknownFolder(other.to_string())),
        }
    }

    /// Ensures the workspace root exists.
    pub async fn prepare(&self) -> Result<(), EngineError> {
        info!("preparing workspace");
        self.mkdir("workspace", &[]).await?;
        Ok(())
    }

    /// Builds one run from a workflow definition, registers it by id,
    /// prepares it, executes it if preparation left it pending, and returns
    /// it for inspection.
    pub async fn execute_definition(&mut self, def: &WorkflowDefinition) -> Result<&Run, EngineError> {
        let mut run = Run::new(def, &self.config);
        info!(run_id = %run.id(), "executing workflow definition");

        run.prepare(&self.config).await?;
        if run.status() == Status::Pending {
            run.execute(self.spawner.as_ref(), &self.config).await?;
        }

        let id = run.id().to_string();
        let registered = self.runs.entry(id).or_insert(run);
        Ok(&*registered)
    }

    /// Recursively deletes every entry under the workspace root. A full
    /// hygiene reset, not per-run isolation.
    pub async fn cleanup(&self) -> Result<(), EngineError> {
        let mut entries = fs::read_dir(&self.config.workspace_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}
