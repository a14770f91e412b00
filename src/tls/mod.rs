//! TLS provisioning for the peer and client transports.
//!
//! A role is either plaintext, secured by a caller supplied bundle (validated
//! up front), or secured by material generated here: one self-signed CA per
//! role per cluster and one leaf per node, with the node's advertised hosts as
//! subject alternative names. Generated material is written once when the
//! cluster starts and never regenerated for the lifetime of the cluster, so a
//! restarted node keeps the identity its peers and clients already trust.

mod authority;
mod client;
mod pem;
mod provisioner;

pub use authority::*;
pub use client::*;
pub use pem::*;
pub use provisioner::*;
