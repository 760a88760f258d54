//! Structured user-facing errors
//!
//! Every failure the operator should see is reported as a [`UserError`]: a
//! numeric code, a category from a flat taxonomy, a message template with
//! `{name}` placeholders and the arguments that fill it. Library crates
//! declare their codes as [`ErrorDefinition`] constants and raise them through
//! `anyhow`; the CLI recovers them with `downcast_ref::<UserError>()` and writes
//! them to the error file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::utils::write_atomic;

/// Flat error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad resource definition, missing port, ambiguous install target
    UserConfiguration,
    /// Missing executable, wrong OS, insufficient permissions
    Environment,
    /// Subprocess failure, liveness timeout
    Execution,
    /// The run failed but the prior state was restored
    RollbackInProgress,
    /// The run failed and rollback also failed
    RollbackFailed,
    /// Programming error surfaced as a user error
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::UserConfiguration => "user configuration error",
            ErrorCategory::Environment => "environment error",
            ErrorCategory::Execution => "execution error",
            ErrorCategory::RollbackInProgress => "rollback in progress",
            ErrorCategory::RollbackFailed => "rollback failed",
            ErrorCategory::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Static description of one error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDefinition {
    pub code: u32,
    pub component: &'static str,
    pub category: ErrorCategory,
    pub template: &'static str,
}

impl ErrorDefinition {
    pub const fn new(
        code: u32,
        component: &'static str,
        category: ErrorCategory,
        template: &'static str,
    ) -> Self {
        Self {
            code,
            component,
            category,
            template,
        }
    }
}

/// Codes owned by engage-core
pub mod codes {
    use super::{ErrorCategory, ErrorDefinition};

    pub const RESOURCE_FILE_INVALID: ErrorDefinition = ErrorDefinition::new(
        101,
        "core",
        ErrorCategory::UserConfiguration,
        "Unable to read resource list {path}: {reason}",
    );

    pub const DATABASE_INVALID: ErrorDefinition = ErrorDefinition::new(
        102,
        "core",
        ErrorCategory::Environment,
        "Installed resource database {path} is unreadable: {reason}",
    );

    pub const SETTINGS_INVALID: ErrorDefinition = ErrorDefinition::new(
        103,
        "core",
        ErrorCategory::UserConfiguration,
        "Engine settings file {path} is invalid: {reason}",
    );

    pub const UPGRADE_ROLLBACK_IN_PROGRESS: ErrorDefinition = ErrorDefinition::new(
        110,
        "core",
        ErrorCategory::RollbackInProgress,
        "Upgrade failed at resource {id}; the previous installation was restored. Cause: {cause}",
    );

    pub const INSTALL_ROLLED_BACK: ErrorDefinition = ErrorDefinition::new(
        111,
        "core",
        ErrorCategory::RollbackInProgress,
        "Install failed at resource {id}; resources installed by this run were removed. Cause: {cause}",
    );

    pub const ROLLBACK_FAILED: ErrorDefinition = ErrorDefinition::new(
        112,
        "core",
        ErrorCategory::RollbackFailed,
        "Operation failed at resource {id} and rollback also failed: {rollback_cause}. Original cause: {cause}",
    );
}

/// A structured, categorized, user-facing error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserError {
    pub code: u32,
    pub component: String,
    pub category: ErrorCategory,
    pub message_template: String,
    #[serde(default)]
    pub message_args: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<Box<UserError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<Box<UserError>>,
}

impl UserError {
    /// Create an error from a definition with no arguments yet
    pub fn new(def: &ErrorDefinition) -> Self {
        Self {
            code: def.code,
            component: def.component.to_string(),
            category: def.category,
            message_template: def.template.to_string(),
            message_args: BTreeMap::new(),
            developer_message: None,
            context: Vec::new(),
            resource_id: None,
            original_error: None,
            rollback_error: None,
        }
    }

    /// Set a template argument
    pub fn arg(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.message_args.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_developer_message(mut self, msg: impl Into<String>) -> Self {
        self.developer_message = Some(msg.into());
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn for_resource(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_original(mut self, err: UserError) -> Self {
        self.original_error = Some(Box::new(err));
        self
    }

    pub fn with_rollback_error(mut self, err: UserError) -> Self {
        self.rollback_error = Some(Box::new(err));
        self
    }

    /// True for codes declared by `def`
    pub fn is(&self, def: &ErrorDefinition) -> bool {
        self.code == def.code
    }

    /// Substitute `{name}` placeholders with message arguments.
    ///
    /// Placeholders without a matching argument are left in place.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.message_template.len());
        let mut rest = self.message_template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.message_args.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Wrap an arbitrary error as a structured one, reusing it if it already is.
    pub fn from_anyhow(err: &anyhow::Error, def: &ErrorDefinition) -> Self {
        match err.downcast_ref::<UserError>() {
            Some(user_error) => user_error.clone(),
            None => UserError::new(def)
                .arg("reason", err)
                .with_developer_message(format!("{:#}", err)),
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::error::Error for UserError {}

/// The well-known error file tooling reads after a failed run
pub struct ErrorFile;

impl ErrorFile {
    /// Write `err` as pretty JSON
    pub fn write(path: &Path, err: &UserError) -> Result<()> {
        let json = serde_json::to_string_pretty(err)?;
        write_atomic(path, json.as_bytes(), None)?;
        Ok(())
    }

    /// Read back an error file
    pub fn read(path: &Path) -> Result<UserError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::codes::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_substitutes_arguments() {
        let err = UserError::new(&RESOURCE_FILE_INVALID)
            .arg("path", "/tmp/r.json")
            .arg("reason", "eof");
        assert_eq!(
            err.render(),
            "Unable to read resource list /tmp/r.json: eof"
        );
    }

    #[test]
    fn test_render_keeps_unknown_placeholders() {
        let err = UserError::new(&RESOURCE_FILE_INVALID).arg("path", "x");
        assert_eq!(err.render(), "Unable to read resource list x: {reason}");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = UserError::new(&UPGRADE_ROLLBACK_IN_PROGRESS)
            .arg("id", "django")
            .for_resource("django")
            .into();

        let recovered = err.downcast_ref::<UserError>().unwrap();
        assert_eq!(recovered.category, ErrorCategory::RollbackInProgress);
        assert_eq!(recovered.resource_id.as_deref(), Some("django"));
    }

    #[test]
    fn test_from_anyhow_wraps_plain_errors() {
        let err = anyhow::anyhow!("boom");
        let wrapped = UserError::from_anyhow(&err, &DATABASE_INVALID);
        assert_eq!(wrapped.code, 102);
        assert_eq!(wrapped.message_args.get("reason").unwrap(), "boom");
    }

    #[test]
    fn test_error_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log/user_error.json");

        let original = UserError::new(&ROLLBACK_FAILED)
            .arg("id", "django")
            .arg("cause", "install failed")
            .arg("rollback_cause", "uninstall failed")
            .for_resource("django")
            .with_original(UserError::new(&RESOURCE_FILE_INVALID).arg("path", "p"))
            .with_rollback_error(UserError::new(&DATABASE_INVALID));

        ErrorFile::write(&path, &original).unwrap();
        let loaded = ErrorFile::read(&path).unwrap();

        assert_eq!(loaded, original);
        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"category\": \"rollback_failed\""));
    }
}
