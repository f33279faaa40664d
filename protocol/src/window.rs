use crate::Message;

/// Selects the suffix of `messages` that fits within `char_budget` characters
/// of content, walking from the newest message backwards and dropping the
/// oldest messages first once the budget is exceeded.
///
/// The newest message is always retained, even when it alone blows the
/// budget; an upstream context error is more useful than silently sending an
/// empty conversation. Relative order of the retained messages is unchanged.
pub fn windowed_history(messages: &[Message], char_budget: usize) -> &[Message] {
    let mut used = 0usize;
    let mut start = messages.len();
    for (idx, message) in messages.iter().enumerate().rev() {
        used = used.saturating_add(message.content.chars().count());
        if used > char_budget && idx + 1 < messages.len() {
            break;
        }
        start = idx;
        if used > char_budget {
            break;
        }
    }
    &messages[start..]
}
