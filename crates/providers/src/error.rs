use std::time::Duration;

use imagegen_core::error::CoreError;

/// Errors from provider resolution and provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request is not acceptable to this provider.
    #[error("{0}")]
    Validation(String),

    /// No enabled, credentialed config exists for the provider name.
    #[error("Provider '{0}' is not configured or disabled")]
    NotConfigured(String),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Provider call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A successful response carried no image.
    #[error("Provider returned no image data")]
    EmptyResponse,

    /// A downloaded image was larger than the accepted asset size.
    #[error("Provider image exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl From<CoreError> for ProviderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Fail with [`ProviderError::Api`] unless `response` is a success.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: truncate(&body, 2_000),
        });
    }
    Ok(response)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
