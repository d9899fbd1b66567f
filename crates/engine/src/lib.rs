//! # Runlet Engine
//!
//! A sandboxed workflow execution runtime: given a declarative definition of
//! jobs composed of ordered steps, the engine runs each step as an isolated
//! subprocess under a minimal, per-step computed permission grant, tracks
//! hierarchical run state (run → job → step), resolves action identifiers to
//! executable locations, and carries data between steps via exchange files
//! and templated expressions.
//!
//! ## Architecture
//!
//! - **`state`**: the lifecycle state machine composed into every runnable
//!   entity (monotonic pending → running → terminal, plus a typed slot store)
//! - **`actions`**: action-identifier resolution (`bin://` shorthand,
//!   standard-actions prefix, command-target conversion)
//! - **`permissions`**: least-privilege sandbox-grant computation
//! - **`spawn`**: the narrow process-spawner seam and its `deno run` backed
//!   production implementation
//! - **`executor`**: the manager/run/job/step hierarchy itself

pub mod actions;
pub mod error;
pub mod executor;
pub mod permissions;
pub mod spawn;
pub mod state;

pub use actions::{DEFAULT_INTERPRETER, RUN_ACTION, SCRIPT_EXTENSION, ResolvedAction, ScriptPayload};
pub use error::EngineError;
pub use executor::{
    DEFAULT_STD_ACTIONS_PREFIX, EARLIER_FAILURE_SKIP_MESSAGE, ENV_FILE_VAR, Job, Manager, ManagerConfig,
    OUTPUT_FILE_VAR, Run, RunPaths, SKIP_MESSAGE, Step, StepScope,
};
pub use permissions::{MandatoryGrants, SandboxGrant, Scope};
pub use spawn::{DenoSpawner, ProcessSpawner, SpawnOutcome, SpawnRequest};
pub use state::{LifecycleState, StateKey, StateValue, Status};
