//! Sandbox permission computation for a step's subprocess.
//!
//! The final grant merges the step's declared wishes with the mandatory
//! grants the runtime itself requires. Per category the merge is a union;
//! an explicit `false` on either side closes the category outright, only an
//! explicit `true` opens it fully, and an unset category defaults to deny.
//! The computation never fails: malformed declared shapes are rejected by
//! the definition parser long before this point.

use runlet_types::{PermissionRule, PermissionsDefinition};

/// Access level of one permission category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    /// Nothing allowed (the default).
    #[default]
    None,
    /// Unrestricted access.
    All,
    /// Closed allow-list, deduplicated in insertion order.
    List(Vec<String>),
}

impl Scope {
    /// Entries of a list scope; empty for `None` and `All`.
    pub fn entries(&self) -> &[String] {
        match self {
            Scope::List(entries) => entries,
            _ => &[],
        }
    }
}

/// The computed sandbox grant for one subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxGrant {
    /// Readable filesystem paths.
    pub read: Scope,
    /// Writable filesystem paths.
    pub write: Scope,
    /// Visible environment variable names.
    pub env: Scope,
    /// Allowed sub-process spawn targets.
    pub run: Scope,
}

impl SandboxGrant {
    /// Renders the grant as `deno run` permission flags.
    pub fn to_deno_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        for (name, scope) in [
            ("allow-read", &self.read),
            ("allow-write", &self.write),
            ("allow-env", &self.env),
            ("allow-run", &self.run),
        ] {
            match scope {
                Scope::None => {}
                Scope::All => flags.push(format!("--{name}")),
                Scope::List(entries) => flags.push(format!("--{name}={}", entries.join(","))),
            }
        }
        flags
    }
}

/// Grants the runtime itself requires for a step, independent of what the
/// step declared. Optional paths that are not yet known are carried as `None`
/// and dropped before the final grant is produced.
#[derive(Debug, Clone, Default)]
pub struct MandatoryGrants {
    /// Paths the subprocess must be able to read.
    pub read: Vec<Option<String>>,
    /// Paths the subprocess must be able to write.
    pub write: Vec<Option<String>>,
    /// Environment variable names that must stay visible.
    pub env: Vec<String>,
}

/// Merges declared permission wishes with the mandatory grants.
pub fn merge_permissions(declared: &PermissionsDefinition, mandatory: &MandatoryGrants) -> SandboxGrant {
    let read_paths: Vec<String> = mandatory.read.iter().flatten().cloned().collect();
    let write_paths: Vec<String> = mandatory.write.iter().flatten().cloned().collect();
    SandboxGrant {
        read: merge_category(declared.read.as_ref(), &read_paths),
        write: merge_category(declared.write.as_ref(), &write_paths),
        env: merge_category(declared.env.as_ref(), &mandatory.env),
        run: merge_category(declared.run.as_ref(), &[]),
    }
}

/// Ensures `target` appears in the declared spawn allow-list, unless the
/// category was explicitly closed. Used for the inline-script interpreter,
/// which must be spawnable even when the author declared an empty list.
pub fn allow_spawn_target(declared: &mut PermissionsDefinition, target: &str) {
    match &mut declared.run {
        Some(PermissionRule::All(false)) | Some(PermissionRule::All(true)) => {}
        Some(PermissionRule::List(entries)) => {
            if !entries.iter().any(|entry| entry == target) {
                entries.push(target.to_string());
            }
        }
        None => declared.run = Some(PermissionRule::List(vec![target.to_string()])),
    }
}

fn merge_category(declared: Option<&PermissionRule>, mandatory: &[String]) -> Scope {
    match declared {
        Some(PermissionRule::All(false)) => Scope::None,
        Some(PermissionRule::All(true)) => Scope::All,
        Some(PermissionRule::List(entries)) => union(entries, mandatory),
        None => union(&[], mandatory),
    }
}

fn union(declared: &[String], mandatory: &[String]) -> Scope {
    let mut entries: Vec<String> = Vec::with_capacity(declared.len() + mandatory.len());
    for entry in declared.iter().chain(mandatory) {
        if !entry.is_empty() && !entries.contains(entry) {
            entries.push(entry.clone());
        }
    }
    if entries.is_empty() { Scope::None } else { Scope::List(entries) }
}
