//! Action resolution: maps a step's action identifier to an addressable
//! location and normalizes the two step kinds into one invocation shape.
//!
//! Identifiers are classified as "already a location" purely by the presence
//! of a `://` separator; everything else is a bare relative path resolved
//! under the standard-actions base location. The `bin:` scheme is shorthand:
//! `bin://python` rewrites to the built-in `run` action with a `bin=python`
//! query parameter.

use url::Url;

use runlet_types::StepDefinition;

use crate::error::EngineError;

/// File extension appended to bare action identifiers.
pub const SCRIPT_EXTENSION: &str = ".ts";

/// Identifier of the built-in action that executes inline scripts.
pub const RUN_ACTION: &str = "run";

/// Interpreter used when an inline-script step does not declare `input.bin`.
pub const DEFAULT_INTERPRETER: &str = "bash";

/// A step's action resolved to a concrete location, together with the
/// normalized inline-script payload (if any) so downstream environment and
/// permission code stays kind-agnostic.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    /// Addressable location of the action program.
    pub url: Url,
    /// Inline-script payload for steps declared with `run:`.
    pub script: Option<ScriptPayload>,
}

/// Normalized inline-script invocation details.
#[derive(Debug, Clone)]
pub struct ScriptPayload {
    /// Interpreter the script is fed to.
    pub interpreter: String,
    /// Literal script text.
    pub body: String,
    /// Extra argv entries for the interpreter.
    pub args: Vec<String>,
}

/// Resolves a step definition into a [`ResolvedAction`].
///
/// Inline-script steps resolve as if their action were the built-in `run`
/// action; named-action steps resolve their identifier directly.
pub fn resolve_action_from_definition(def: &StepDefinition, std_prefix: &str) -> Result<ResolvedAction, EngineError> {
    match def {
        StepDefinition::Script(script) => Ok(ResolvedAction {
            url: resolve_action_url(RUN_ACTION, std_prefix)?,
            script: Some(ScriptPayload {
                interpreter: script
                    .input
                    .get("bin")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
                body: script.run.clone(),
                args: script.args.clone(),
            }),
        }),
        StepDefinition::Action(action) => Ok(ResolvedAction {
            url: resolve_action_url(&action.action, std_prefix)?,
            script: None,
        }),
    }
}

/// Resolves an action identifier to its location.
pub fn resolve_action_url(action: &str, std_prefix: &str) -> Result<Url, EngineError> {
    if action.contains("://") {
        let url = parse_location(action)?;
        if url.scheme() == "bin" {
            let interpreter = url.host_str().unwrap_or_default().to_string();
            let mut run_url = resolve_action_url(RUN_ACTION, std_prefix)?;
            run_url.query_pairs_mut().append_pair("bin", &interpreter);
            return Ok(run_url);
        }
        return Ok(url);
    }

    let extension = if action.ends_with(SCRIPT_EXTENSION) { "" } else { SCRIPT_EXTENSION };
    let location = format!("{}/{action}{extension}", std_prefix.trim_end_matches('/'));
    parse_location(&location)
}

/// Converts a resolved location into the addressing form the process spawner
/// accepts: a filesystem path for `file:`, the location string for `http(s):`.
pub fn command_target(url: &Url) -> Result<String, EngineError> {
    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(|path| path.to_string_lossy().into_owned())
            .map_err(|_| EngineError::UnsupportedProtocol(format!("{}:", url.scheme()))),
        "http" | "https" => Ok(url.as_str().to_string()),
        other => Err(EngineError::UnsupportedProtocol(format!("{other}:"))),
    }
}

fn parse_location(location: &str) -> Result<Url, EngineError> {
    Url::parse(location).map_err(|source| EngineError::Validation(format!("invalid action location {location}: {source}")))
}
