//! Job: an ordered group of steps sharing a context directory.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{debug, info, warn};

use runlet_types::JobDefinition;

use crate::error::EngineError;
use crate::executor::manager::ManagerConfig;
use crate::executor::run::RunPaths;
use crate::executor::step::{Step, StepScope};
use crate::spawn::ProcessSpawner;
use crate::state::{LifecycleState, Status, short_id};

/// Result message recorded on steps that never ran because an earlier
/// sibling failed.
pub const EARLIER_FAILURE_SKIP_MESSAGE: &str = "Step was skipped because an earlier step failed";

/// One named unit of work inside a run.
pub struct Job {
    id: String,
    name: String,
    steps: Vec<Step>,
    context_dir: Option<PathBuf>,
    state: LifecycleState,
}

impl Job {
    /// Creates a pending job and its pending steps from a definition.
    pub fn new(name: &str, def: &JobDefinition) -> Self {
        Self {
            id: short_id("job"),
            name: name.to_string(),
            steps: def.steps.iter().cloned().map(Step::new).collect(),
            context_dir: None,
            state: LifecycleState::new(),
        }
    }

    /// Generated process-unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Job name from the workflow definition.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Aggregated result message.
    pub fn result(&self) -> &str {
        self.state.result()
    }

    /// The job's steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Context directory, set by `prepare()`.
    pub fn context_dir(&self) -> Option<&Path> {
        self.context_dir.as_deref()
    }

    /// Context exposed to step expressions: name, status, and the union of
    /// every step's outputs in declaration order.
    pub fn context(&self) -> Value {
        let mut outputs: IndexMap<String, String> = IndexMap::new();
        for step in &self.steps {
            outputs.extend(step.outputs());
        }
        json!({
            "name": self.name,
            "status": self.state.status(),
            "outputs": outputs,
        })
    }

    /// Snapshot of the lifecycle state merged with per-step snapshots.
    pub fn combined_state(&self) -> Value {
        let mut snapshot: Map<String, Value> = self.state.combined_state();
        snapshot.insert("id".into(), json!(self.id));
        snapshot.insert("name".into(), json!(self.name));
        snapshot.insert(
            "steps".into(),
            Value::Array(self.steps.iter().map(Step::combined_state).collect()),
        );
        Value::Object(snapshot)
    }

    /// Creates the job's context directory and prepares every step.
    pub async fn prepare(&mut self, run_context_dir: &Path, config: &ManagerConfig) -> Result<(), EngineError> {
        let context_dir = run_context_dir.join(&self.id);
        fs::create_dir_all(&context_dir).await?;
        for step in &mut self.steps {
            step.prepare(&context_dir, config).await?;
        }
        self.context_dir = Some(context_dir);
        debug!(job_id = %self.id, name = %self.name, step_count = self.steps.len(), "job prepared");
        Ok(())
    }

    /// Runs every step in declaration order.
    ///
    /// Short-circuits: once a step has failed, the job is failed and every
    /// later pending sibling is skipped rather than executed.
    pub async fn execute(
        &mut self,
        paths: &RunPaths,
        spawner: &dyn ProcessSpawner,
        config: &ManagerConfig,
    ) -> Result<(), EngineError> {
        self.state.start()?;
        info!(job_id = %self.id, name = %self.name, "job execution started");

        for index in 0..self.steps.len() {
            if self.state.status() == Status::Failed {
                self.steps[index].mark_skipped(EARLIER_FAILURE_SKIP_MESSAGE)?;
                continue;
            }

            let siblings = self.sibling_contexts(index);
            let job_context = self.context();
            let step = &mut self.steps[index];
            step.execute(StepScope {
                job_context,
                siblings,
                paths,
                spawner,
                config,
            })
            .await?;

            if step.status() == Status::Failed {
                let message = format!("Step {} failed", step.name());
                warn!(job_id = %self.id, name = %self.name, step = %self.steps[index].name(), "job failed");
                self.fail(&message)?;
            }
        }

        if self.state.status() == Status::Running {
            self.state.succeed()?;
        }
        self.state.stop();
        info!(job_id = %self.id, name = %self.name, status = %self.state.status(), "job execution finished");
        Ok(())
    }

    /// Marks the job failed with a reason. Steps already in flight are not
    /// cancelled; later pending steps will be skipped by the execute loop.
    pub fn fail(&mut self, reason: &str) -> Result<(), EngineError> {
        if self.state.status().is_terminal() {
            return Ok(());
        }
        self.state.fail(reason)
    }

    fn sibling_contexts(&self, excluded_index: usize) -> Value {
        let mut contexts = Map::new();
        for (index, step) in self.steps.iter().enumerate() {
            if index == excluded_index {
                continue;
            }
            contexts.insert(step.name().to_string(), step.context());
        }
        Value::Object(contexts)
    }
}
