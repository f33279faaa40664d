use serde::Deserialize;
use serde::Serialize;

/// Opaque identifiers for the upstream resources a token grants access to.
///
/// The provider owns these resources and bounds their lifetime; this crate
/// only carries the identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandles {
    pub assistant_id: String,
    pub vector_store_id: String,
}

/// The claims set embedded in a capability token before encryption.
///
/// Field names match the JSON payload the service has always emitted, so
/// tokens are inspectable with standard tooling once decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityClaims {
    pub assistant_id: String,
    pub vector_store_id: String,
    /// Caller identity at issuance time. Empty means anonymous issuance;
    /// anyone may redeem such a token.
    pub user_name: String,
    /// Unix seconds, stamped at encryption time. Never client-supplied.
    pub iat: i64,
}

impl CapabilityClaims {
    pub fn handles(&self) -> ResourceHandles {
        ResourceHandles {
            assistant_id: self.assistant_id.clone(),
            vector_store_id: self.vector_store_id.clone(),
        }
    }
}
