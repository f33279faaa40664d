use std::convert::Infallible;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures::Stream;
use relay_protocol::ChatBody;
use relay_protocol::windowed_history;
use relay_provider::CompletionRequest;
use relay_provider::CompletionStream;
use relay_provider::ProviderError;

use crate::state::AppState;

/// Builds the upstream completion request for one chat turn, applying the
/// defaults and the conversation window policy.
pub fn build_request(state: &AppState, identity: String, body: &ChatBody) -> CompletionRequest {
    let config = &state.config;
    let window = windowed_history(&body.messages, config.history_char_budget);
    if window.len() < body.messages.len() {
        tracing::debug!(
            dropped = body.messages.len() - window.len(),
            "conversation window exceeded; dropped oldest messages"
        );
    }

    CompletionRequest {
        model: body
            .model
            .clone()
            .unwrap_or_else(|| config.default_model.to_string()),
        system_prompt: body
            .prompt
            .clone()
            .unwrap_or_else(|| config.default_system_prompt.to_string()),
        temperature: Some(body.temperature.unwrap_or(config.default_temperature)),
        messages: window.to_vec(),
        user: identity,
        assistant_id: body.assistant_id.clone(),
        vector_store_id: body.vector_store_id.clone(),
    }
}

/// Starts the upstream streaming call. Errors here mean the stream could
/// not be established and are reported to the client as a plain 500.
pub async fn open(
    state: &AppState,
    identity: String,
    body: &ChatBody,
) -> Result<RelayStream<CompletionStream>, ProviderError> {
    let request = build_request(state, identity, body);
    let upstream = state.provider.stream_chat(&request).await?;
    Ok(RelayStream::new(upstream))
}

/// Forwards upstream text chunks to the client connection verbatim, in
/// arrival order.
///
/// A mid-flight upstream failure terminates the stream: the chunks already
/// written cannot be revoked and there is no structured error channel left,
/// so the failure is logged and the connection simply ends. Nothing is
/// retried. Dropping this stream (client disconnect) drops the upstream
/// stream with it, which stops the provider read.
pub struct RelayStream<S> {
    upstream: S,
    done: bool,
}

impl<S> RelayStream<S> {
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            done: false,
        }
    }
}

impl<S> Stream for RelayStream<S>
where
    S: Stream<Item = Result<String, ProviderError>> + Unpin,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.upstream).poll_next(cx) {
            Poll::Ready(Some(Ok(text))) => Poll::Ready(Some(Ok(Bytes::from(text)))),
            Poll::Ready(Some(Err(error))) => {
                tracing::warn!("relay stream failed mid-flight: {error}");
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
