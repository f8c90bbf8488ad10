use reqwest::Client;
use std::time::Duration;

/// Client for reasoning-capability calls; model answers can take a while.
pub fn build_provider_client() -> Client {
    build_client_with_timeout(120)
}

/// Shared pool settings for every outbound client in the crate.
pub fn build_client_with_timeout(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Event streams stay open indefinitely, so no request timeout.
pub fn build_stream_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}
