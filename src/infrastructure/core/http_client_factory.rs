use reqwest::Client;
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates the HTTP client used for collector pushes.
    ///
    /// No client-level retry or overall timeout: the exporter owns both, and
    /// each request carries its own per-attempt timeout.
    pub fn create_client(connect_timeout: Duration) -> Client {
        Client::builder()
            .pool_max_idle_per_host(2)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("metric-pusher/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("HttpClientFactory: falling back to default client: {}", e);
                Client::new()
            })
    }
}
