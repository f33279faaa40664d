use std::time::Duration;

use chrono::Utc;
use relay_protocol::ChatBody;
use relay_protocol::Message;
use relay_provider::CompletionRequest;
use relay_provider::ProviderError;
use serde::Deserialize;
use thiserror::Error;

use crate::state::AppState;

/// How many search results are fed into the answer.
const RESULT_COUNT: usize = 5;
/// Per-page fetch budget. A slow source is dropped, not waited for.
const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest excerpt of a fetched page that makes it into the prompt.
const SOURCE_TEXT_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("google search is not configured")]
    NotConfigured,
    #[error("no user message to search for")]
    EmptyQuery,
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize, Clone)]
struct SearchItem {
    link: String,
    #[serde(default)]
    snippet: String,
}

struct Source {
    item: SearchItem,
    text: String,
}

/// Answers the newest user message using live web search results as context.
///
/// Runs a Google Custom Search query, fetches each hit (soft-failing to the
/// result snippet when a page is slow or unreadable), and asks the model for
/// a cited answer over those excerpts. Non-streaming by design: the model
/// needs the full source set before it can answer.
pub async fn answer(state: &AppState, identity: String, body: &ChatBody) -> Result<Message, SearchError> {
    let (Some(api_key), Some(cse_id)) = (
        state.config.google_api_key.as_deref(),
        state.config.google_cse_id.as_deref(),
    ) else {
        return Err(SearchError::NotConfigured);
    };

    let query = body
        .messages
        .iter()
        .rev()
        .find(|m| !m.content.is_empty())
        .map(|m| m.content.clone())
        .ok_or(SearchError::EmptyQuery)?;

    let http = &state.http;
    let result_count = RESULT_COUNT.to_string();
    let response: SearchResponse = http
        .get(&state.config.google_search_url)
        .query(&[
            ("key", api_key),
            ("cx", cse_id),
            ("q", query.as_str()),
            ("num", result_count.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let fetches = response
        .items
        .into_iter()
        .take(RESULT_COUNT)
        .map(|item| fetch_source(http, item));
    let sources: Vec<Source> = futures::future::join_all(fetches).await;

    let request = CompletionRequest {
        model: body
            .model
            .clone()
            .unwrap_or_else(|| state.config.default_model.to_string()),
        system_prompt: state.config.default_system_prompt.clone(),
        temperature: Some(body.temperature.unwrap_or(state.config.default_temperature)),
        messages: vec![Message::user(&cited_answer_prompt(&query, &sources))],
        user: identity,
        assistant_id: None,
        vector_store_id: None,
    };
    let answer = state.provider.complete(&request).await?;
    Ok(Message::assistant(&answer))
}

/// Fetches one result page. Any failure (timeout, HTTP error, unreadable
/// body) degrades to the search snippet rather than failing the answer.
async fn fetch_source(http: &reqwest::Client, item: SearchItem) -> Source {
    let fetched = tokio::time::timeout(SOURCE_FETCH_TIMEOUT, async {
        http.get(&item.link)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    })
    .await;

    let text = match fetched {
        Ok(Ok(html)) => truncate_chars(&strip_html(&html), SOURCE_TEXT_LIMIT),
        Ok(Err(error)) => {
            tracing::debug!(link = %item.link, "source fetch failed: {error}");
            item.snippet.clone()
        }
        Err(_) => {
            tracing::debug!(link = %item.link, "source fetch timed out");
            item.snippet.clone()
        }
    };
    Source { item, text }
}

fn cited_answer_prompt(query: &str, sources: &[Source]) -> String {
    let mut prompt = String::from(
        "Provide me with the information I requested. Use the sources to provide an accurate \
         response. Respond in markdown format. Cite the sources you use as a markdown link as \
         you use them at the end of each sentence by number of the source (ex: [[1]](link)). \
         Provide an accurate response and then stop. Today's date is ",
    );
    prompt.push_str(&Utc::now().format("%Y-%m-%d").to_string());
    prompt.push_str(".\n\n");
    for (index, source) in sources.iter().enumerate() {
        prompt.push_str(&format!(
            "Source [{}](link: {}):\n{}\n\n",
            index + 1,
            source.item.link,
            source.text,
        ));
    }
    prompt.push_str(&format!("Input: {query}"));
    prompt
}

/// Reduces an HTML document to whitespace-normalized text. Scripts and
/// styles are removed wholesale; every other tag is stripped in place.
fn strip_html(html: &str) -> String {
    let without_blocks = remove_element(&remove_element(html, "script"), "style");

    let mut text = String::with_capacity(without_blocks.len());
    let mut in_tag = false;
    for ch in without_blocks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }
    collapsed.trim_end().to_string()
}

fn remove_element(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII-only lowering keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(&open) {
        let start = cursor + start;
        out.push_str(&html[cursor..start]);
        match lower[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[cursor..]);
    out
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
