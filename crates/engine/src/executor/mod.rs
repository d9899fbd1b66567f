//! The execution hierarchy: manager → run → job → step.

pub mod job;
pub mod manager;
pub mod run;
pub mod step;

pub use job::{EARLIER_FAILURE_SKIP_MESSAGE, Job};
pub use manager::{DEFAULT_STD_ACTIONS_PREFIX, Manager, ManagerConfig};
pub use run::{Run, RunPaths};
pub use step::{ENV_FILE_VAR, OUTPUT_FILE_VAR, SKIP_MESSAGE, Step, StepScope};
