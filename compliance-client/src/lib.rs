//! Compliance HTTP Clients
//!
//! Typed HTTP clients for the collaborators the compliance scheduler
//! consumes but does not own:
//! - [`ComplianceApiClient`]: benchmark and control definitions, benchmark assignments
//! - [`SearchClient`]: result document counts in the search index
//!
//! # Example
//!
//! ```no_run
//! use compliance_client::ComplianceApiClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ComplianceApiClient::new("http://localhost:7251");
//!
//!     let benchmark = client.get_benchmark("aws_cis_v200").await?;
//!     println!("{} has {} children", benchmark.id, benchmark.children.len());
//!     Ok(())
//! }
//! ```

mod benchmarks;
pub mod error;
pub mod search;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use search::SearchClient;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the benchmark/control lookup API
#[derive(Debug, Clone)]
pub struct ComplianceApiClient {
    /// Base URL of the compliance API (e.g., "http://localhost:7251")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ComplianceApiClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use compliance_client::ComplianceApiClient;
    ///
    /// let client = ComplianceApiClient::new("http://localhost:7251");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the compliance API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// `what` names the requested resource so a 404 turns into
/// [`ClientError::NotFound`].
pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(what.to_string()));
    }

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ComplianceApiClient::new("http://localhost:7251");
        assert_eq!(client.base_url(), "http://localhost:7251");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ComplianceApiClient::new("http://localhost:7251/");
        assert_eq!(client.base_url(), "http://localhost:7251");
    }
}
