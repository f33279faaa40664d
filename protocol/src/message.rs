use serde::Deserialize;
use serde::Serialize;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of the conversation. Messages are immutable once sent; their
/// order in `ChatBody::messages` is the conversation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Client-side wall clock in milliseconds. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Request body of the chat relay endpoint.
///
/// Unknown fields are ignored so that older clients which still send unused
/// keys (`key`, `fileIds`) keep working.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    /// System prompt override. Clients may control this.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub vector_store_id: Option<String>,
}
