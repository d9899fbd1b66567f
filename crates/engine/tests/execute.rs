//! End-to-end execution tests over a scripted stand-in for the process
//! spawner, so no real subprocesses run.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use runlet_engine::{
    EARLIER_FAILURE_SKIP_MESSAGE, ENV_FILE_VAR, EngineError, Manager, ManagerConfig, OUTPUT_FILE_VAR,
    ProcessSpawner, SKIP_MESSAGE, SpawnOutcome, SpawnRequest, Status, DEFAULT_STD_ACTIONS_PREFIX,
};
use runlet_types::WorkflowDefinition;

/// Interprets `INPUT_SCRIPT` line directives instead of spawning anything:
/// `set-output N=V`, `set-env N=V` append to the exchange files, `print T`
/// emits a stdout line, `exit N` sets the exit code.
#[derive(Clone, Default)]
struct ScriptedSpawner {
    requests: Arc<Mutex<Vec<SpawnRequest>>>,
}

impl ScriptedSpawner {
    fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ProcessSpawner for ScriptedSpawner {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, EngineError> {
        self.requests.lock().expect("requests lock").push(request.clone());

        let mut outcome = SpawnOutcome::default();
        let script = request.env.get("INPUT_SCRIPT").cloned().unwrap_or_default();
        for line in script.lines() {
            let line = line.trim();
            if let Some(assignment) = line.strip_prefix("set-output ") {
                append_line(request.env.get(OUTPUT_FILE_VAR).expect("output file var"), assignment);
            } else if let Some(assignment) = line.strip_prefix("set-env ") {
                append_line(request.env.get(ENV_FILE_VAR).expect("env file var"), assignment);
            } else if let Some(text) = line.strip_prefix("print ") {
                outcome.stdout.push(text.to_string());
            } else if let Some(code) = line.strip_prefix("exit ") {
                outcome.code = code.parse().expect("exit code directive");
            }
        }
        Ok(outcome)
    }
}

fn append_line(path: &str, line: &str) {
    let mut file = std::fs::OpenOptions::new().append(true).open(path).expect("open exchange file");
    writeln!(file, "{line}").expect("append exchange line");
}

fn definition(yaml: &str) -> WorkflowDefinition {
    serde_yaml::from_str(yaml).expect("parse workflow definition")
}

fn manager_for(workspace: &TempDir, spawner: ScriptedSpawner) -> Manager {
    let config = ManagerConfig {
        workspace_dir: workspace.path().to_path_buf(),
        execution_uid: 0,
        execution_gid: 0,
        std_actions_prefix: DEFAULT_STD_ACTIONS_PREFIX.to_string(),
    };
    Manager::with_spawner(config, Box::new(spawner)).expect("manager")
}

#[tokio::test]
async fn env_exchange_feeds_sibling_when_condition() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  pipeline:
    steps:
      - name: A
        run: "set-env X=1"
      - name: B
        when: "steps.A.env.X == '1'"
        run: "print ok"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    assert_eq!(run.status(), Status::Success);
    let steps = run.jobs()[0].steps();
    assert_eq!(steps[0].status(), Status::Success);
    assert_eq!(steps[0].env().get("X").map(String::as_str), Some("1"));
    assert_eq!(steps[1].status(), Status::Success, "B must not be skipped");
    assert_eq!(spawner.requests().len(), 2);
}

#[tokio::test]
async fn outputs_round_trip_through_exchange_file() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_for(&workspace, ScriptedSpawner::default());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: emit
        run: |
          set-output OUT1=hello
          set-output OUT2=world
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    let outputs = run.jobs()[0].steps()[0].outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs["OUT1"], "hello");
    assert_eq!(outputs["OUT2"], "world");
}

#[tokio::test]
async fn nonzero_exit_code_fails_step_job_and_run() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_for(&workspace, ScriptedSpawner::default());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: broken
        run: "exit 3"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    let step = &run.jobs()[0].steps()[0];
    assert_eq!(step.status(), Status::Failed);
    assert_eq!(step.state().result(), "Action failed with code 3");
    assert_eq!(step.state().exit_code(), Some(3));
    assert_eq!(run.jobs()[0].status(), Status::Failed);
    assert_eq!(run.jobs()[0].result(), "Step broken failed");
    assert_eq!(run.status(), Status::Failed);
    assert_eq!(run.exit_code(), 3);
}

#[tokio::test]
async fn falsy_when_skips_before_any_side_effect() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: gated
        when: "false"
        run: "print never"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    let step = &run.jobs()[0].steps()[0];
    assert_eq!(step.status(), Status::Skipped);
    assert_eq!(step.state().result(), SKIP_MESSAGE);
    assert!(spawner.requests().is_empty(), "spawner must not be invoked");

    // No exchange files were created in the step's context directory.
    let context_dir = step.context_dir().expect("context dir");
    let leftovers = std::fs::read_dir(context_dir).expect("read context dir").count();
    assert_eq!(leftovers, 0);
    assert_eq!(run.status(), Status::Success);
}

#[tokio::test]
async fn failed_step_short_circuits_later_siblings() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: first
        run: "exit 1"
      - name: second
        run: "print unreachable"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    let steps = run.jobs()[0].steps();
    assert_eq!(steps[0].status(), Status::Failed);
    assert_eq!(steps[1].status(), Status::Skipped);
    assert_eq!(steps[1].state().result(), EARLIER_FAILURE_SKIP_MESSAGE);
    assert_eq!(spawner.requests().len(), 1);

    // stop() ran exactly once for the executed step; the skipped sibling
    // never started, so it was never stopped.
    assert_eq!(steps[0].state().stop_count(), 1);
    assert_eq!(steps[1].state().stop_count(), 0);
}

#[tokio::test]
async fn unsupported_scheme_fails_step_without_escaping_the_run() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: exotic
        action: "ftp://example.com/tool"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute must not raise");

    let step = &run.jobs()[0].steps()[0];
    assert_eq!(step.status(), Status::Failed);
    assert!(step.state().result().contains("Unsupported protocol"));
    assert_eq!(run.jobs()[0].status(), Status::Failed);
    assert_eq!(run.status(), Status::Failed);
    assert!(spawner.requests().is_empty());
    // No subprocess ran, so there is no exit code to mirror.
    assert_eq!(run.exit_code(), 0);
}

#[tokio::test]
async fn script_interpreter_is_always_spawnable_and_defaults_to_bash() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: scripted
        run: "print hi"
        permissions:
          run: []
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");
    assert_eq!(run.status(), Status::Success);

    let requests = spawner.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.env.get("INPUT_BIN").map(String::as_str), Some("bash"));
    assert_eq!(request.env.get("INPUT_SCRIPT").map(String::as_str), Some("print hi"));
    assert!(request.permissions.run.entries().contains(&"bash".to_string()));

    // Mandatory grants scope the exchange files and scratch dirs.
    let stage = run.paths().stage_dir.to_string_lossy().into_owned();
    assert!(request.permissions.read.entries().contains(&stage));
    let bin = run.paths().bin_dir.to_string_lossy().into_owned();
    assert!(request.permissions.write.entries().contains(&bin));
    assert!(request.env.contains_key(OUTPUT_FILE_VAR));
    assert!(request.env.contains_key(ENV_FILE_VAR));
}

#[tokio::test]
async fn bin_shorthand_surfaces_query_parameters_as_arg_vars() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - name: shorthand
        action: "bin://python"
"#,
    );
    manager.execute_definition(&def).await.expect("execute");

    let requests = spawner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].env.get("ARG_BIN").map(String::as_str), Some("python"));
    assert_eq!(requests[0].target, "https://actions.runlet.dev/run.ts?bin=python");
}

#[tokio::test]
async fn later_jobs_still_run_after_a_job_failure() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let spawner = ScriptedSpawner::default();
    let mut manager = manager_for(&workspace, spawner.clone());

    let def = definition(
        r#"
jobs:
  first:
    steps:
      - name: broken
        run: "exit 2"
  second:
    steps:
      - name: fine
        run: "print ok"
"#,
    );
    let run = manager.execute_definition(&def).await.expect("execute");

    assert_eq!(run.jobs()[0].status(), Status::Failed);
    assert_eq!(run.jobs()[1].status(), Status::Success);
    assert_eq!(run.status(), Status::Failed);
    assert_eq!(run.result(), "Job first failed");
    assert_eq!(run.exit_code(), 2);
}

#[tokio::test]
async fn executed_runs_are_registered_by_id() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_for(&workspace, ScriptedSpawner::default());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - run: "print ok"
"#,
    );
    let id = manager.execute_definition(&def).await.expect("execute").id().to_string();

    assert_eq!(manager.runs().len(), 1);
    let registered = manager.run(&id).expect("registered run");
    assert_eq!(registered.status(), Status::Success);
}

#[tokio::test]
async fn manager_rejects_missing_workspace_and_unknown_scopes() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let missing = workspace.path().join("does-not-exist");
    let config = ManagerConfig {
        workspace_dir: missing,
        execution_uid: 0,
        execution_gid: 0,
        std_actions_prefix: DEFAULT_STD_ACTIONS_PREFIX.to_string(),
    };
    let error = Manager::new(config).expect_err("missing workspace must fail fast");
    assert!(matches!(error, EngineError::Validation(_)));

    let manager = manager_for(&workspace, ScriptedSpawner::default());
    let error = manager.mkdir("scratch", &["a"]).await.expect_err("unknown scope");
    assert!(matches!(error, EngineError::UnknownFolder(ref scope) if scope == "scratch"));
}

#[tokio::test]
async fn cleanup_empties_the_workspace_root() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_for(&workspace, ScriptedSpawner::default());

    let def = definition(
        r#"
jobs:
  j:
    steps:
      - run: "print ok"
"#,
    );
    manager.execute_definition(&def).await.expect("execute");
    std::fs::write(workspace.path().join("stray.txt"), "x").expect("stray file");
    assert!(std::fs::read_dir(workspace.path()).expect("read workspace").count() > 0);

    manager.cleanup().await.expect("cleanup");
    assert_eq!(std::fs::read_dir(workspace.path()).expect("read workspace").count(), 0);
}
