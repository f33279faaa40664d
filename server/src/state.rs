use relay_capability::CapabilityCodec;
use relay_capability::TokenIssuer;
use relay_capability::TokenVerifier;
use relay_provider::ProviderClient;

use crate::config::Config;

/// Shared request-handling state. Everything here is immutable after
/// startup; requests share nothing mutable with each other.
pub struct AppState {
    pub config: Config,
    pub provider: ProviderClient,
    /// Client for outbound fetches that are not provider calls (web search
    /// and source pages).
    pub http: reqwest::Client,
    /// Present only when an auth secret is configured. Issuance fails
    /// closed — and performs no provisioning — when this is `None`.
    pub issuer: Option<TokenIssuer<ProviderClient>>,
    pub verifier: Option<TokenVerifier>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let provider = ProviderClient::new(
            config.provider_base_url.clone(),
            config.provider_api_key.clone(),
            config.default_model.clone(),
        );

        // The codec derives the same key from the same secret, so issuer
        // and verifier each get their own instance.
        let issuer = CapabilityCodec::new(&config.auth_secret)
            .ok()
            .map(|codec| TokenIssuer::new(codec, provider.clone()));
        let verifier = CapabilityCodec::new(&config.auth_secret)
            .ok()
            .map(|codec| TokenVerifier::new(codec, config.token_max_age));

        Self {
            config,
            provider,
            http: reqwest::Client::new(),
            issuer,
            verifier,
        }
    }
}
