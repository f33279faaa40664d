use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::ProviderError;

/// How long the pump waits for the next SSE event before giving up on the
/// upstream connection.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(75);

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Live sequence of completion text fragments, in upstream arrival order.
///
/// The stream ends after the upstream `[DONE]` marker or, on failure, after
/// one terminal `Err` item.
#[derive(Debug)]
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<String, ProviderError>>,
}

impl Stream for CompletionStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Pumps the SSE body of an established completion call into a channel.
///
/// The channel holds a single chunk: the pump does not read the next SSE
/// event until the consumer has taken the previous one, so upstream reads
/// track the client's write pace instead of buffering ahead. When the
/// consumer goes away the send fails, the task returns, and dropping the
/// response body aborts the upstream connection.
pub(crate) fn spawn_completion_stream(response: reqwest::Response) -> CompletionStream {
    let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(1);

    tokio::spawn(async move {
        let mut events = response.bytes_stream().eventsource();
        loop {
            // Content-less deltas never reach a send, so a departed consumer
            // must also be noticed here, not only on send failure.
            if tx.is_closed() {
                return;
            }
            let event = match timeout(STREAM_IDLE_TIMEOUT, events.next()).await {
                Ok(Some(Ok(event))) => event,
                Ok(Some(Err(error))) => {
                    let _ = tx.send(Err(ProviderError::Stream(error.to_string()))).await;
                    return;
                }
                Ok(None) => return,
                Err(_) => {
                    let _ = tx
                        .send(Err(ProviderError::Stream(
                            "idle timeout waiting for completion stream".to_string(),
                        )))
                        .await;
                    return;
                }
            };

            if event.data.trim() == "[DONE]" {
                return;
            }

            let chunk: ChatChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(error) => {
                    tracing::debug!("skipping unparseable stream event: {error}");
                    continue;
                }
            };

            for choice in chunk.choices {
                if let Some(text) = choice.delta.content
                    && !text.is_empty()
                    && tx.send(Ok(text)).await.is_err()
                {
                    // Consumer disconnected; stop pulling from upstream.
                    return;
                }
            }
        }
    });

    CompletionStream { rx }
}
