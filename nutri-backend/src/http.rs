use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Upper bound for one model or search request; individual tools may lower it
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("nutri-ai/", env!("CARGO_PKG_VERSION"));

// Claude calls and Google searches from every agent go through this one pool.
static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            log::error!("Failed to build shared HTTP client, using defaults: {}", e);
            Client::new()
        })
});

/// Client shared by the model client and the web tools. Cloning is cheap.
pub fn shared_client() -> &'static Client {
    &SHARED_CLIENT
}
