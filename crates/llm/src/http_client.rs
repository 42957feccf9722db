//! HTTP Client Factory
//!
//! Builds reqwest clients with the per-request timeout from a provider config.

use std::time::Duration;

use crate::types::{LlmError, LlmResult, ProviderConfig};

/// Connect timeout applied to every provider client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a `reqwest::Client` whose requests are bounded by the configured timeout.
///
/// The timeout covers one network call, including reading a streamed body.
pub fn build_http_client(config: &ProviderConfig) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| LlmError::Other {
            message: format!("failed to build HTTP client: {}", e),
        })
}
