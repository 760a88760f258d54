//! Type definitions for Engage

mod resource;
mod version;

pub use resource::*;
pub use version::{compare_versions, is_upgrade};
