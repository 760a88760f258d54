//! Error codes raised while planning and running installs
//!
//! 2xx codes describe bad resource lists, 3xx a machine that cannot run the
//! plan, 4xx failures while executing it.

use engage_core::user_error::{ErrorCategory, ErrorDefinition, UserError};

pub const DUPLICATE_RESOURCE: ErrorDefinition = ErrorDefinition::new(
    201,
    "install",
    ErrorCategory::UserConfiguration,
    "Resource id {id} appears more than once in the resource list",
);

pub const UNKNOWN_DEPENDENCY: ErrorDefinition = ErrorDefinition::new(
    202,
    "install",
    ErrorCategory::UserConfiguration,
    "Resource {id} depends on {target}, which is not in the resource list",
);

pub const PORT_MAPPING_INVALID: ErrorDefinition = ErrorDefinition::new(
    203,
    "install",
    ErrorCategory::UserConfiguration,
    "Resource {id} maps input port {input_port} to {target}.{output_port}: {reason}",
);

pub const AMBIGUOUS_INSTALL_TARGET: ErrorDefinition = ErrorDefinition::new(
    204,
    "install",
    ErrorCategory::UserConfiguration,
    "More than one resource is marked use_as_install_target: {ids}",
);

pub const MISSING_INSTALL_TARGET: ErrorDefinition = ErrorDefinition::new(
    205,
    "install",
    ErrorCategory::UserConfiguration,
    "No resource is marked use_as_install_target",
);

pub const DEPENDENCY_CYCLE: ErrorDefinition = ErrorDefinition::new(
    206,
    "install",
    ErrorCategory::UserConfiguration,
    "Resource dependencies form a cycle among: {ids}",
);

pub const NO_ROOT_RESOURCE: ErrorDefinition = ErrorDefinition::new(
    207,
    "install",
    ErrorCategory::UserConfiguration,
    "Every resource depends on another one; the resource list has no root",
);

pub const DRIVER_NOT_FOUND: ErrorDefinition = ErrorDefinition::new(
    208,
    "install",
    ErrorCategory::UserConfiguration,
    "No driver is registered for resource {id} ({key})",
);

pub const DRIVER_MANIFEST_INVALID: ErrorDefinition = ErrorDefinition::new(
    209,
    "install",
    ErrorCategory::UserConfiguration,
    "Driver manifest {path} is invalid: {reason}",
);

pub const UNKNOWN_HOST: ErrorDefinition = ErrorDefinition::new(
    210,
    "install",
    ErrorCategory::UserConfiguration,
    "No host resource named {host} exists in the plan; known hosts: {hosts}",
);

pub const NODE_HAS_DEPENDENTS: ErrorDefinition = ErrorDefinition::new(
    211,
    "install",
    ErrorCategory::UserConfiguration,
    "Cannot remove node {host}: resources on other nodes depend on it ({ids})",
);

pub const MISSING_EXECUTABLE: ErrorDefinition = ErrorDefinition::new(
    301,
    "install",
    ErrorCategory::Environment,
    "Required executable {program} was not found on PATH",
);

pub const SUDO_PASSWORD_REQUIRED: ErrorDefinition = ErrorDefinition::new(
    302,
    "install",
    ErrorCategory::Environment,
    "Running {command} requires superuser access, but no sudo password is stored for {user}",
);

pub const WRONG_OS: ErrorDefinition = ErrorDefinition::new(
    303,
    "install",
    ErrorCategory::Environment,
    "Resource {id} expects operating system {expected}, but this machine runs {actual}",
);

pub const HOST_MISMATCH: ErrorDefinition = ErrorDefinition::new(
    304,
    "install",
    ErrorCategory::Environment,
    "Install target {id} is machine {expected}, but engage is running on {actual}",
);

pub const COMMAND_FAILED: ErrorDefinition = ErrorDefinition::new(
    401,
    "install",
    ErrorCategory::Execution,
    "Command {command} failed with {status}",
);

pub const LIVENESS_TIMEOUT: ErrorDefinition = ErrorDefinition::new(
    402,
    "install",
    ErrorCategory::Execution,
    "Service {id} was not {state} after {attempts} checks over {seconds}s",
);

pub const UNEXPECTED_DRIVER_ERROR: ErrorDefinition = ErrorDefinition::new(
    403,
    "install",
    ErrorCategory::Execution,
    "Resource {id} failed during {step}: {reason}",
);

pub const POST_INSTALL_VALIDATION_FAILED: ErrorDefinition = ErrorDefinition::new(
    404,
    "install",
    ErrorCategory::Execution,
    "Resource {id} failed post-install validation: {reason}",
);

/// Structured form of a driver failure.
///
/// Errors that already carry a [`UserError`] keep it and gain the resource
/// id; anything else becomes [`UNEXPECTED_DRIVER_ERROR`].
pub fn driver_error(err: &anyhow::Error, resource_id: &str, step: &str) -> UserError {
    match err.downcast_ref::<UserError>() {
        Some(user_error) => {
            let mut user_error = user_error.clone();
            if user_error.resource_id.is_none() {
                user_error.resource_id = Some(resource_id.to_string());
            }
            user_error
        }
        None => UserError::new(&UNEXPECTED_DRIVER_ERROR)
            .arg("id", resource_id)
            .arg("step", step)
            .arg("reason", err)
            .for_resource(resource_id)
            .with_developer_message(format!("{:#}", err)),
    }
}
