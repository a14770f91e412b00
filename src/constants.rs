use std::net::Ipv4Addr;

// -
// Network

/// Every node of a local cluster listens on the loopback interface
pub(crate) const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

pub const HTTP_SCHEME: &str = "http://";
pub const HTTPS_SCHEME: &str = "https://";

// -
// Cluster working area layout (relative to `root_dir`)

pub(crate) const NODE_DIR_PREFIX: &str = "node-";
pub(crate) const CONF_DIR: &str = "conf";
pub(crate) const LOGS_DIR: &str = "logs";
pub(crate) const TLS_DIR: &str = "tls";

// -
// TLS material file names

pub(crate) const CA_CERT_FILE: &str = "ca.pem";
pub(crate) const CONSUMER_NAME: &str = "client";

// -
// Node process environment

/// Environment variable holding the path of the rendered node config
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Environment prefix the reference node honours for config overrides
pub const NODE_ENV_PREFIX: &str = "NODE";

// -
// Reference node data directory files

pub(crate) const KV_DB_FILE: &str = "kv.db";
pub(crate) const MEMBER_FILE: &str = "member.db";
