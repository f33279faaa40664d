//! Stateless capability tokens.
//!
//! A capability token is an authenticated-encrypted credential binding a
//! caller's identity to the pair of upstream resource handles (assistant +
//! vector store) provisioned for them. The token is the only state that
//! survives between requests; the server keeps no session table.

mod claims;
mod codec;
mod error;
mod issuer;

pub use claims::CapabilityClaims;
pub use claims::ResourceHandles;
pub use codec::CapabilityCodec;
pub use error::IssueError;
pub use error::ProvisionError;
pub use error::TokenError;
pub use issuer::ResourceProvisioner;
pub use issuer::TokenIssuer;
pub use issuer::TokenVerifier;
