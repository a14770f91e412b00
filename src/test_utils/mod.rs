//! Shared fixtures for the unit tests of the node and cluster modules
mod common;
mod mock;

pub use common::*;
pub use mock::*;
