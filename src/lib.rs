//! A local test harness for multi-node key-value clusters.
//!
//! [`Cluster::start`] allocates ports and data directories, provisions peer
//! and client TLS, launches one process per node and hands back a handle
//! that can stop, restart and shut down individual nodes while the cluster
//! keeps its identity and data.
//!
//! The crate also ships the reference store node those processes run (see
//! [`store`] and the `d-engine-harness` binary).

mod cluster;
mod config;
mod constants;
mod errors;
mod node;
mod port;
mod tls;

pub mod store;
pub mod utils;

pub use cluster::*;
pub use config::*;
pub use constants::CONFIG_PATH_ENV;
pub use constants::HTTPS_SCHEME;
pub use constants::HTTP_SCHEME;
pub use constants::NODE_ENV_PREFIX;
pub use errors::*;
pub use node::*;
pub use port::*;
pub use tls::*;
pub use utils::cluster::majority_count;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
