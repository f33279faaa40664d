use axum::http::HeaderMap;

/// Header a trusted reverse proxy injects with the authenticated caller's
/// name. Spoofable when no such proxy fronts the deployment, so the value
/// is used for scoping capability tokens, never as a sole authorization
/// gate.
pub const IDENTITY_HEADER: &str = "x-ms-client-principal-name";

/// Resolves the caller identity. Empty string means anonymous/untrusted.
pub fn caller_identity(headers: &HeaderMap) -> String {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}
