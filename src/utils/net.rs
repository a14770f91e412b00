use tokio::net::TcpStream;

use crate::constants::HTTPS_SCHEME;
use crate::constants::HTTP_SCHEME;

/// Strips any `http://` or `https://` prefix, leaving `host:port`.
pub(crate) fn strip_scheme(addr: &str) -> &str {
    addr.trim_start_matches(HTTP_SCHEME).trim_start_matches(HTTPS_SCHEME)
}

/// Re-adds a single scheme prefix matching the transport security.
pub(crate) fn address_str(
    addr: &str,
    tls: bool,
) -> String {
    let scheme = if tls { HTTPS_SCHEME } else { HTTP_SCHEME };
    format!("{}{}", scheme, strip_scheme(addr))
}

pub(crate) async fn is_server_ready(addr: &str) -> bool {
    TcpStream::connect(strip_scheme(addr)).await.is_ok()
}
