//! Built-in drivers
//!
//! - `host`: the machine itself; always installed, checks the OS
//! - `command`: shell commands per lifecycle step, configured in `drivers.yaml`

pub mod command;
pub mod host;

pub use command::{CommandDriver, CommandSpec};
pub use host::HostDriver;
