//! Common test utilities for engage-install
//!
//! - A recording mock driver whose failures can be injected per step
//! - Resource list fixtures (host / mysql / django)
//! - Context and registry builders over a temporary deployment home

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
