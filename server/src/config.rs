use std::time::Duration;

/// Process-wide configuration, read from the environment once at startup and
/// immutable afterwards. Components receive the values they need through
/// their constructors; nothing reads the environment at request time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret the capability-token key is derived from. Empty means token
    /// issuance and token-based upload authorization are disabled.
    pub auth_secret: String,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub default_model: String,
    pub default_system_prompt: String,
    pub default_temperature: f32,
    /// Character budget for the outbound conversation window. Oldest
    /// messages are dropped first once the budget is exceeded.
    pub history_char_budget: usize,
    /// Maximum redeemable age of a capability token. `None` disables the
    /// age check.
    pub token_max_age: Option<Duration>,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    /// Google Custom Search endpoint; overridable for tests.
    pub google_search_url: String,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Follow the user's \
     instructions carefully. Respond using markdown.";

/// Tokens stay redeemable as long as the vector store they point at (30
/// days), unless configured otherwise.
const DEFAULT_TOKEN_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

impl Config {
    pub fn from_env() -> Self {
        let token_max_age = match std::env::var("RELAY_TOKEN_MAX_AGE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_TOKEN_MAX_AGE_SECS)),
        };

        Self {
            auth_secret: env_or_default("RELAY_AUTH_SECRET", ""),
            provider_base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            provider_api_key: env_or_default("OPENAI_API_KEY", ""),
            default_model: env_or_default("RELAY_DEFAULT_MODEL", "gpt-4"),
            default_system_prompt: env_or_default(
                "RELAY_DEFAULT_SYSTEM_PROMPT",
                DEFAULT_SYSTEM_PROMPT,
            ),
            default_temperature: std::env::var("RELAY_DEFAULT_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            history_char_budget: std::env::var("RELAY_HISTORY_CHAR_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(48_000),
            token_max_age,
            google_api_key: std::env::var("GOOGLE_API_KEY").ok().filter(|v| !v.is_empty()),
            google_cse_id: std::env::var("GOOGLE_CSE_ID").ok().filter(|v| !v.is_empty()),
            google_search_url: env_or_default(
                "RELAY_GOOGLE_SEARCH_URL",
                "https://customsearch.googleapis.com/customsearch/v1",
            ),
        }
    }

    /// A configuration suitable for tests: points at `provider_base_url`
    /// with sane defaults everywhere else.
    pub fn for_tests(provider_base_url: String, auth_secret: &str) -> Self {
        Self {
            auth_secret: auth_secret.to_string(),
            provider_base_url,
            provider_api_key: "test-key".to_string(),
            default_model: "gpt-4".to_string(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_temperature: 1.0,
            history_char_budget: 48_000,
            token_max_age: Some(Duration::from_secs(DEFAULT_TOKEN_MAX_AGE_SECS)),
            google_api_key: None,
            google_cse_id: None,
            google_search_url: "http://127.0.0.1:0".to_string(),
        }
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}
