use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use crate::claims::CapabilityClaims;
use crate::claims::ResourceHandles;
use crate::codec::CapabilityCodec;
use crate::error::IssueError;
use crate::error::ProvisionError;
use crate::error::TokenError;

/// Allocates the upstream resource pair a token refers to. Implemented by
/// the provider client; kept as a trait so issuance is testable without a
/// live provider.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn provision(&self) -> Result<ResourceHandles, ProvisionError>;
}

/// Issues capability tokens: provisions resources, stamps the claims with
/// the current time and the caller's identity, and encrypts.
///
/// Every call creates two new provider-side resources, so issuance is not
/// idempotent and callers must not retry it blindly.
pub struct TokenIssuer<P> {
    codec: CapabilityCodec,
    provisioner: P,
}

impl<P: ResourceProvisioner> TokenIssuer<P> {
    pub fn new(codec: CapabilityCodec, provisioner: P) -> Self {
        Self { codec, provisioner }
    }

    pub async fn issue(&self, identity: &str) -> Result<String, IssueError> {
        let handles = self.provisioner.provision().await?;
        let claims = CapabilityClaims {
            assistant_id: handles.assistant_id,
            vector_store_id: handles.vector_store_id,
            user_name: identity.to_string(),
            iat: now_unix(),
        };
        Ok(self.codec.encrypt(&claims)?)
    }
}

/// Verifies a presented token and resolves the resource handles it grants.
pub struct TokenVerifier {
    codec: CapabilityCodec,
    max_age: Option<Duration>,
}

impl TokenVerifier {
    /// `max_age` bounds how long after issuance a token stays redeemable.
    /// `None` disables the age check.
    pub fn new(codec: CapabilityCodec, max_age: Option<Duration>) -> Self {
        Self { codec, max_age }
    }

    /// Decrypts `token` and checks it against `caller_identity`.
    ///
    /// A token issued to a non-empty identity is only redeemable by that
    /// identity; this is the sole binding that stops one caller replaying
    /// another's token. A token issued anonymously (empty identity) is
    /// redeemable by anyone, which is the accepted weaker mode for
    /// deployments without a trusted identity header.
    pub fn verify(
        &self,
        token: &str,
        caller_identity: &str,
    ) -> Result<ResourceHandles, TokenError> {
        self.verify_at(token, caller_identity, now_unix())
    }

    fn verify_at(
        &self,
        token: &str,
        caller_identity: &str,
        now: i64,
    ) -> Result<ResourceHandles, TokenError> {
        let claims = self.codec.decrypt(token)?;
        if !claims.user_name.is_empty() && claims.user_name != caller_identity {
            return Err(TokenError::IdentityMismatch);
        }
        if let Some(max_age) = self.max_age
            && now.saturating_sub(claims.iat)
                > i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX)
        {
            return Err(TokenError::Expired);
        }
        Ok(claims.handles())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedProvisioner;

    #[async_trait]
    impl ResourceProvisioner for FixedProvisioner {
        async fn provision(&self) -> Result<ResourceHandles, ProvisionError> {
            Ok(ResourceHandles {
                assistant_id: "asst_fixed".to_string(),
                vector_store_id: "vs_fixed".to_string(),
            })
        }
    }

    struct FailingProvisioner;

    #[async_trait]
    impl ResourceProvisioner for FailingProvisioner {
        async fn provision(&self) -> Result<ResourceHandles, ProvisionError> {
            Err(ProvisionError::new("quota exceeded"))
        }
    }

    fn codec() -> CapabilityCodec {
        CapabilityCodec::new("issuer test secret").unwrap()
    }

    fn handles() -> ResourceHandles {
        ResourceHandles {
            assistant_id: "asst_fixed".to_string(),
            vector_store_id: "vs_fixed".to_string(),
        }
    }

    #[tokio::test]
    async fn issue_then_verify_binds_identity() {
        let issuer = TokenIssuer::new(codec(), FixedProvisioner);
        let verifier = TokenVerifier::new(codec(), None);

        let token = issuer.issue("alice").await.unwrap();
        assert_eq!(verifier.verify(&token, "alice").unwrap(), handles());
        assert_eq!(
            verifier.verify(&token, "bob").unwrap_err(),
            TokenError::IdentityMismatch
        );
    }

    #[tokio::test]
    async fn anonymous_token_redeems_for_anyone() {
        let issuer = TokenIssuer::new(codec(), FixedProvisioner);
        let verifier = TokenVerifier::new(codec(), None);

        let token = issuer.issue("").await.unwrap();
        assert_eq!(verifier.verify(&token, "anyone").unwrap(), handles());
        assert_eq!(verifier.verify(&token, "").unwrap(), handles());
    }

    #[tokio::test]
    async fn provisioning_failure_carries_provider_message() {
        let issuer = TokenIssuer::new(codec(), FailingProvisioner);
        let err = issuer.issue("alice").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn stale_token_is_rejected_and_fresh_one_accepted() {
        let verifier = TokenVerifier::new(codec(), Some(Duration::from_secs(3600)));
        let issued_at = 1_700_000_000;
        let claims = CapabilityClaims {
            assistant_id: "asst_fixed".to_string(),
            vector_store_id: "vs_fixed".to_string(),
            user_name: String::new(),
            iat: issued_at,
        };
        let token = codec().encrypt(&claims).unwrap();

        let fresh = verifier.verify_at(&token, "", issued_at + 60);
        assert_eq!(fresh.unwrap(), handles());

        let stale = verifier.verify_at(&token, "", issued_at + 3601);
        assert_eq!(stale.unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn oversized_max_age_never_expires_tokens() {
        let verifier = TokenVerifier::new(codec(), Some(Duration::from_secs(u64::MAX)));
        let claims = CapabilityClaims {
            assistant_id: "asst_fixed".to_string(),
            vector_store_id: "vs_fixed".to_string(),
            user_name: String::new(),
            iat: 0,
        };
        let token = codec().encrypt(&claims).unwrap();
        assert_eq!(verifier.verify_at(&token, "", i64::MAX).unwrap(), handles());
    }

    #[test]
    fn identity_check_runs_before_age_check() {
        let verifier = TokenVerifier::new(codec(), Some(Duration::from_secs(1)));
        let claims = CapabilityClaims {
            assistant_id: "a".to_string(),
            vector_store_id: "v".to_string(),
            user_name: "alice".to_string(),
            iat: 0,
        };
        let token = codec().encrypt(&claims).unwrap();
        assert_eq!(
            verifier.verify(&token, "mallory").unwrap_err(),
            TokenError::IdentityMismatch
        );
    }
}
