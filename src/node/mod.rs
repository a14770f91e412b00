//! One store process and everything needed to (re)launch it.
//!
//! [`Node`] is the lifecycle state machine, [`NodeConfig`] the immutable
//! description rendered once at cluster start, and [`Launcher`] /
//! [`NodeProcess`] the seams between the state machine and the OS.

mod layout;
mod node;
mod node_config;
mod probe;
mod process;

pub use layout::*;
pub use node::*;
pub use node_config::*;
pub use probe::*;
pub use process::*;


use crate::constants::NODE_DIR_PREFIX;

/// Stable name of the node at `index`, used for its data directory and
/// certificate file names.
pub fn node_name(index: usize) -> String {
    format!("{NODE_DIR_PREFIX}{index}")
}
