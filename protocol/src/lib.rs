//! Wire types shared between the relay server and the upstream provider
//! client, plus the conversation-window policy applied before a request is
//! forwarded upstream.

mod message;
mod window;

pub use message::ChatBody;
pub use message::Message;
pub use message::Role;
pub use window::windowed_history;
