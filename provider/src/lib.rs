//! HTTP client for the upstream OpenAI-compatible provider.
//!
//! Covers the four upstream surfaces the relay needs: resource provisioning
//! (assistant + vector store), file upload and vector-store attachment,
//! streaming chat completions over SSE, and one-shot completions.

mod chat;
mod client;
mod error;
mod stream;

pub use chat::CompletionRequest;
pub use client::ProviderClient;
pub use error::ProviderError;
pub use stream::CompletionStream;
