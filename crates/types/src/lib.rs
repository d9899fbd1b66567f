//! Shared type definitions for the runlet workflow runner.
//!
//! The authoritative input format lives in [`workflow`]: a declarative,
//! order-preserving description of jobs and steps that the engine turns into
//! an execution hierarchy. Nothing in this crate performs I/O; it is the
//! serde boundary shared by the engine and the CLI.

pub mod workflow;

pub use workflow::{
    JobDefinition, PermissionRule, PermissionsDefinition, StepDefinition, WorkflowDefinition,
};
