//! Step: the smallest schedulable unit, one action invocation plus lifecycle
//! state.
//!
//! `execute()` follows a fixed protocol: evaluate the skip condition, create
//! the two exchange files, assemble the invocation environment, compute the
//! sandbox grant, spawn the action, read the exchanged data back, and settle
//! into a terminal state. Every failure inside that protocol is recovered at
//! this boundary into a terminal `failed` state; nothing propagates past the
//! step except lifecycle-API misuse.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Value, json};
use tokio::fs;
use tracing::{debug, info};

use runlet_types::{PermissionsDefinition, StepDefinition};
use runlet_util::{evaluate_expression, interpolate, is_truthy, parse_variable_file, replace_variable_placeholders};

use crate::actions::{ResolvedAction, command_target, resolve_action_from_definition};
use crate::error::EngineError;
use crate::executor::manager::ManagerConfig;
use crate::executor::run::RunPaths;
use crate::permissions::{MandatoryGrants, allow_spawn_target, merge_permissions};
use crate::spawn::{ProcessSpawner, SpawnRequest};
use crate::state::{LifecycleState, StateKey, StateValue, Status, short_id};

/// Environment variable carrying the output exchange file path.
pub const OUTPUT_FILE_VAR: &str = "RUNLET_OUTPUT";

/// Environment variable carrying the env exchange file path.
pub const ENV_FILE_VAR: &str = "RUNLET_ENV";

/// Result message recorded when a step's `when` condition is falsy.
pub const SKIP_MESSAGE: &str = "Step was skipped due to \"when\" condition";

/// Everything a step borrows from its owners for the duration of one
/// `execute()` call.
pub struct StepScope<'a> {
    /// Context snapshot of the owning job.
    pub job_context: Value,
    /// Context snapshots of every sibling step, keyed by name (self excluded).
    pub siblings: Value,
    /// The owning run's scratch directories.
    pub paths: &'a RunPaths,
    /// Process-spawner facade exposed by the run.
    pub spawner: &'a dyn ProcessSpawner,
    /// Process-wide configuration.
    pub config: &'a ManagerConfig,
}

enum StepOutcome {
    Skipped,
    Exited(i32),
}

/// One step of a job.
pub struct Step {
    id: String,
    name: String,
    def: StepDefinition,
    action: Option<ResolvedAction>,
    context_dir: Option<PathBuf>,
    state: LifecycleState,
}

impl Step {
    /// Creates a pending step from its definition.
    pub fn new(def: StepDefinition) -> Self {
        let id = short_id("step");
        let name = def.name().map(str::to_string).unwrap_or_else(|| id.clone());
        Self {
            id,
            name,
            def,
            action: None,
            context_dir: None,
            state: LifecycleState::new(),
        }
    }

    /// Generated process-unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Author-supplied name, or the generated id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Lifecycle state, including the slot store.
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Context directory, set by `prepare()`.
    pub fn context_dir(&self) -> Option<&Path> {
        self.context_dir.as_deref()
    }

    /// Outputs reported through the output exchange file.
    pub fn outputs(&self) -> IndexMap<String, String> {
        self.state.variables(StateKey::Outputs)
    }

    /// Environment reported through the env exchange file.
    pub fn env(&self) -> IndexMap<String, String> {
        self.state.variables(StateKey::Env)
    }

    /// Context exposed to sibling steps' expressions.
    pub fn context(&self) -> Value {
        json!({
            "name": self.name,
            "outputs": self.outputs(),
            "env": self.env(),
            "status": self.state.status(),
            "result": self.state.result(),
        })
    }

    /// Snapshot of the lifecycle state merged with this step's definition.
    pub fn combined_state(&self) -> Value {
        let mut snapshot = self.state.combined_state();
        snapshot.insert("id".into(), json!(self.id));
        snapshot.insert("name".into(), json!(self.name));
        snapshot.insert("definition".into(), serde_json::to_value(&self.def).unwrap_or(Value::Null));
        Value::Object(snapshot)
    }

    /// Creates the step's context directory and resolves its action location.
    pub async fn prepare(&mut self, job_context_dir: &Path, config: &ManagerConfig) -> Result<(), EngineError> {
        let context_dir = job_context_dir.join(&self.id);
        fs::create_dir_all(&context_dir).await?;
        self.context_dir = Some(context_dir);
        self.action = Some(resolve_action_from_definition(&self.def, &config.std_actions_prefix)?);
        debug!(step_id = %self.id, name = %self.name, "step prepared");
        Ok(())
    }

    /// Marks a never-started step as skipped.
    pub fn mark_skipped(&mut self, reason: &str) -> Result<(), EngineError> {
        self.state.skip(reason)
    }

    /// Runs the step to a terminal state.
    ///
    /// Failures raised while the action runs are converted into a terminal
    /// `failed` state here; the returned error covers lifecycle misuse only.
    /// `stop()` runs on every exit path after a successful `start()`.
    pub async fn execute(&mut self, scope: StepScope<'_>) -> Result<(), EngineError> {
        self.state.start()?;

        let outcome = self.run_action(&scope).await;
        let transition = match outcome {
            Ok(StepOutcome::Skipped) => {
                info!(step_id = %self.id, name = %self.name, "step skipped by condition");
                self.state.skip(SKIP_MESSAGE)
            }
            Ok(StepOutcome::Exited(0)) => {
                debug!(step_id = %self.id, name = %self.name, "step succeeded");
                self.state.succeed()
            }
            Ok(StepOutcome::Exited(code)) => {
                info!(step_id = %self.id, name = %self.name, code, "step failed");
                self.state.fail(format!("Action failed with code {code}"))
            }
            Err(error) => {
                info!(step_id = %self.id, name = %self.name, error = %error, "step failed");
                self.state.fail(error.to_string())
            }
        };
        self.state.stop();
        transition
    }

    async fn run_action(&mut self, scope: &StepScope<'_>) -> Result<StepOutcome, EngineError> {
        let action = self
            .action
            .clone()
            .ok_or_else(|| EngineError::Validation(format!("step {} executed before its action was resolved", self.id)))?;
        let context_dir = self
            .context_dir
            .clone()
            .ok_or_else(|| EngineError::Validation(format!("step {} executed before its context dir was created", self.id)))?;

        let expression_context = json!({
            "step": self.context(),
            "job": scope.job_context,
            "steps": scope.siblings,
        });

        let when = self.def.when().unwrap_or("true");
        if !is_truthy(&evaluate_expression(when, &expression_context)) {
            return Ok(StepOutcome::Skipped);
        }

        let output_file = context_dir.join(short_id("set-output"));
        let env_file = context_dir.join(short_id("set-env"));
        fs::write(&output_file, "").await?;
        fs::write(&env_file, "").await?;

        let mut env: IndexMap<String, String> = IndexMap::new();
        env.insert(OUTPUT_FILE_VAR.to_string(), output_file.to_string_lossy().into_owned());
        env.insert(ENV_FILE_VAR.to_string(), env_file.to_string_lossy().into_owned());
        for (name, value) in action.url.query_pairs() {
            env.insert(format!("ARG_{}", name.to_uppercase()), value.into_owned());
        }
        for (name, value) in self.def.input() {
            env.insert(format!("INPUT_{}", name.to_uppercase()), interpolate(value, &expression_context));
        }

        let mut declared = self.def.permissions().cloned().unwrap_or_else(PermissionsDefinition::default);
        if let Some(script) = &action.script {
            env.insert("INPUT_BIN".to_string(), script.interpreter.clone());
            env.insert("INPUT_SCRIPT".to_string(), script.body.clone());
            allow_spawn_target(&mut declared, &script.interpreter);
        }

        let context_path = context_dir.to_string_lossy().into_owned();
        let stage_path = scope.paths.stage_dir.to_string_lossy().into_owned();
        let mandatory = MandatoryGrants {
            read: vec![
                Some(env.get(OUTPUT_FILE_VAR).cloned().unwrap_or_default()),
                Some(env.get(ENV_FILE_VAR).cloned().unwrap_or_default()),
                Some(context_path.clone()),
                Some(stage_path.clone()),
                // cwd is the context dir; listed separately to match the
                // grant's working-directory requirement.
                Some(context_path.clone()),
            ],
            write: vec![
                Some(env.get(OUTPUT_FILE_VAR).cloned().unwrap_or_default()),
                Some(env.get(ENV_FILE_VAR).cloned().unwrap_or_default()),
                Some(context_path),
                Some(stage_path),
                Some(scope.paths.bin_dir.to_string_lossy().into_owned()),
            ],
            env: env.keys().cloned().collect(),
        };
        let permissions = merge_permissions(&declared, &mandatory);

        let target = command_target(&action.url)?;
        info!(step_id = %self.id, name = %self.name, target = %target, "running step");

        let request = SpawnRequest {
            target,
            args: action.script.as_ref().map(|script| script.args.clone()).unwrap_or_default(),
            env: replace_variable_placeholders(&env),
            cwd: context_dir,
            permissions,
            uid: scope.config.execution_uid,
            gid: scope.config.execution_gid,
        };
        let outcome = scope.spawner.spawn(request).await?;

        let outputs = parse_variable_file(&fs::read_to_string(&output_file).await?);
        let reported_env = parse_variable_file(&fs::read_to_string(&env_file).await?);
        self.state.set_state(StateKey::Outputs, StateValue::Variables(outputs));
        self.state.set_state(StateKey::Env, StateValue::Variables(reported_env));
        self.state.set_state(StateKey::Stdout, StateValue::Lines(outcome.stdout));
        self.state.set_state(StateKey::Stderr, StateValue::Lines(outcome.stderr));
        self.state.set_state(StateKey::ExitCode, StateValue::Code(outcome.code));

        Ok(StepOutcome::Exited(outcome.code))
    }
}
