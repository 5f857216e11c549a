/// Errors raised while talking to the imagegen server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode server response: {0}")]
    Decode(String),

    /// The progress stream broke or ended early.
    #[error("Progress stream failed: {0}")]
    Transport(String),

    /// Neither the stream nor polling could reach the task.
    #[error("Task unreachable: {0}")]
    Unreachable(String),
}

/// Turn a non-2xx response into [`ClientError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
