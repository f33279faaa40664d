use relay_protocol::Message;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;

use crate::client::ProviderClient;
use crate::client::expect_success;
use crate::error::ProviderError;
use crate::stream::CompletionStream;
use crate::stream::spawn_completion_stream;

/// One outbound chat completion call. The message window policy has already
/// been applied by the caller; this type only shapes the upstream payload.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub messages: Vec<Message>,
    /// Caller identity, forwarded as the `user` field when non-empty.
    pub user: String,
    pub assistant_id: Option<String>,
    pub vector_store_id: Option<String>,
}

impl CompletionRequest {
    fn body(&self, stream: bool) -> serde_json::Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": self.system_prompt,
        })];
        messages.extend(
            self.messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if !self.user.is_empty() {
            body["user"] = json!(self.user);
        }
        if let Some(assistant_id) = &self.assistant_id {
            body["assistant_id"] = json!(assistant_id);
        }
        if let Some(vector_store_id) = &self.vector_store_id {
            body["tools"] = json!([{ "type": "file_search" }]);
            body["tool_resources"] = json!({
                "file_search": { "vector_store_ids": [vector_store_id] },
            });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ProviderClient {
    /// Starts a streaming completion and returns the live chunk stream.
    ///
    /// A failure to establish the call surfaces here with the provider's
    /// message; failures after the first chunk arrive through the stream.
    pub async fn stream_chat(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let response = self
            .http_post_completions(request.body(true))
            .await?;
        let response = expect_success(response).await?;
        Ok(spawn_completion_stream(response))
    }

    /// Runs one non-streaming completion and returns the full answer text.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self.http_post_completions(request.body(false)).await?;
        let parsed: CompletionResponse = expect_success(response).await?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Stream("completion response had no content".to_string()))
    }

    async fn http_post_completions(
        &self,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        Ok(self
            .http_client()
            .post(self.url("chat/completions"))
            .header(AUTHORIZATION, self.bearer())
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?)
    }
}
