use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("staged file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream returned {status}: {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("upstream stream failed: {0}")]
    Stream(String),
}

impl ProviderError {
    /// Extracts the provider's error message from a non-success response.
    ///
    /// OpenAI-style bodies are `{"error": {"message": ...}}`; anything else
    /// is passed through as raw text.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        ProviderError::Api { status, message }
    }
}
