//! Host capabilities: free-port probing and outbound IP discovery.

use std::time::Duration;

use anyhow::{Context, Result};

/// Where the handler asks for its outbound address when none is
/// configured.
const CHECK_IP_URL: &str = "http://checkip.amazonaws.com";

/// Find a free host-local TCP port by binding port 0 and reading back the
/// assigned port. The listener is dropped immediately; the droplet binds
/// the port itself once booted.
pub async fn free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("probing for a free port")?;
    let port = listener.local_addr().context("reading probed port")?.port();
    Ok(port)
}

/// Discover the outbound IP address of this host.
pub async fn outbound_ip() -> Result<String> {
    let client = reqwest::Client::new();
    let body = client
        .get(CHECK_IP_URL)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .context("requesting outbound address")?
        .error_for_status()
        .context("outbound address service rejected the request")?
        .text()
        .await
        .context("reading outbound address")?;
    Ok(body.trim().to_string())
}
