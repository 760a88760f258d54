//! # engage-core
//!
//! Core library for the Engage deployment engine providing:
//! - The resource data model (resources, keys, ports, inside/environment links)
//! - The structured user-facing error taxonomy and the error file
//! - Deployment home layout and engine settings (engage.yaml)
//! - The installed-resource database
//! - Bounded polling used for service liveness checks

pub mod config;
pub mod database;
pub mod error;
pub mod poll;
pub mod types;
pub mod user_error;
pub mod utils;

pub use config::{DeploymentHome, EngineSettings};
pub use database::InstalledResourceDatabase;
pub use error::{Error, Result};
pub use user_error::{ErrorCategory, ErrorDefinition, ErrorFile, UserError};
pub use utils::get_home_dir;
