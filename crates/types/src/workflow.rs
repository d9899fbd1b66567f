//! Strongly typed workflow definition schema shared across the engine and CLI.
//!
//! Definitions intentionally preserve authoring order (via `IndexMap`) so jobs
//! and declared inputs execute and render in a predictable sequence. A step is
//! one of two tagged variants: an *inline script* (`run:` with an optional
//! interpreter) or a *named action* (`action:` resolved against the
//! standard-actions base location).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A full workflow definition: an ordered mapping of job name to job body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Optional human-readable name surfaced in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Jobs keyed by name, preserving author order.
    #[serde(default)]
    pub jobs: IndexMap<String, JobDefinition>,
}

/// One named unit of work: an ordered sequence of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobDefinition {
    /// Optional descriptive copy.
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered list of steps executed sequentially.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// A single schedulable step.
///
/// Serde tries the script shape first: a mapping with a `run` key is an
/// inline script, a mapping with an `action` key is a named action. Presence
/// of the discriminating key is the only classification rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepDefinition {
    /// Inline script executed through the built-in `run` action.
    Script(ScriptStepDefinition),
    /// Named action resolved to an addressable location.
    Action(ActionStepDefinition),
}

/// An inline-script step: a literal script body fed to an interpreter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptStepDefinition {
    /// Optional step name; falls back to the generated step id.
    #[serde(default)]
    pub name: Option<String>,
    /// Literal script text handed to the interpreter on stdin.
    pub run: String,
    /// Extra argv entries passed to the interpreter.
    #[serde(default)]
    pub args: Vec<String>,
    /// Conditional expression; when falsy the step is skipped.
    #[serde(default)]
    pub when: Option<String>,
    /// Declared inputs, each value an expression evaluated at execution time.
    /// The reserved `bin` key selects the interpreter (default `bash`).
    #[serde(default)]
    pub input: IndexMap<String, String>,
    /// Declared permission wishes merged with the runtime's mandatory grants.
    #[serde(default)]
    pub permissions: Option<PermissionsDefinition>,
}

/// A named-action step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionStepDefinition {
    /// Optional step name; falls back to the generated step id.
    #[serde(default)]
    pub name: Option<String>,
    /// Action identifier: a bare path, interpreter shorthand (`bin://python`),
    /// or a full location (`file:`, `http:`, `https:`).
    pub action: String,
    /// Conditional expression; when falsy the step is skipped.
    #[serde(default)]
    pub when: Option<String>,
    /// Declared inputs, each value an expression evaluated at execution time.
    #[serde(default)]
    pub input: IndexMap<String, String>,
    /// Declared permission wishes merged with the runtime's mandatory grants.
    #[serde(default)]
    pub permissions: Option<PermissionsDefinition>,
}

impl StepDefinition {
    /// Author-supplied name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            StepDefinition::Script(step) => step.name.as_deref(),
            StepDefinition::Action(step) => step.name.as_deref(),
        }
    }

    /// Conditional `when` expression, if any.
    pub fn when(&self) -> Option<&str> {
        match self {
            StepDefinition::Script(step) => step.when.as_deref(),
            StepDefinition::Action(step) => step.when.as_deref(),
        }
    }

    /// Declared inputs in author order.
    pub fn input(&self) -> &IndexMap<String, String> {
        match self {
            StepDefinition::Script(step) => &step.input,
            StepDefinition::Action(step) => &step.input,
        }
    }

    /// Declared permission wishes, if any.
    pub fn permissions(&self) -> Option<&PermissionsDefinition> {
        match self {
            StepDefinition::Script(step) => step.permissions.as_ref(),
            StepDefinition::Action(step) => step.permissions.as_ref(),
        }
    }

    /// True when this is an inline-script step.
    pub fn has_run(&self) -> bool {
        matches!(self, StepDefinition::Script(_))
    }
}

/// Declared sandbox permission wishes for one step.
///
/// Each category is a closed allow-list; an unset category stays at the
/// runtime's deny default and only an explicit `true` opens it fully.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermissionsDefinition {
    /// Filesystem paths the subprocess may read.
    #[serde(default)]
    pub read: Option<PermissionRule>,
    /// Filesystem paths the subprocess may write.
    #[serde(default)]
    pub write: Option<PermissionRule>,
    /// Environment variable names visible to the subprocess.
    #[serde(default)]
    pub env: Option<PermissionRule>,
    /// Sub-process spawn targets the subprocess may launch.
    #[serde(default)]
    pub run: Option<PermissionRule>,
}

/// One declared permission category: unrestricted, fully closed, or a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PermissionRule {
    /// `true` grants unrestricted access, `false` closes the category.
    All(bool),
    /// Closed allow-list of entries.
    List(Vec<String>),
}
