use aes_gcm::Aes256Gcm;
use aes_gcm::AeadCore;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::OsRng;
use aes_gcm::aead::Payload;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::claims::CapabilityClaims;
use crate::error::TokenError;

/// Fixed protected header. `dir` means the content-encryption key is used
/// directly (no key wrapping); a future key or algorithm rotation changes
/// this header and old tokens stop verifying instead of being misread.
const PROTECTED_HEADER: &str = r#"{"alg":"dir","enc":"A256GCM"}"#;

/// HKDF info label. Versioned so a future derivation change cannot collide
/// with keys derived today from the same secret.
const KEY_INFO: &[u8] = b"relay-capability-v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts and decrypts capability claims under a single symmetric key
/// derived from the configured server secret.
///
/// Output is JWE compact serialization with direct key agreement:
/// `header..nonce.ciphertext.tag`, each part base64url without padding. The
/// protected header is the additional authenticated data, so tampering with
/// it is detected the same way as tampering with the ciphertext.
pub struct CapabilityCodec {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for CapabilityCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCodec").finish_non_exhaustive()
    }
}

impl CapabilityCodec {
    /// Derives the content-encryption key from `secret` with HKDF-SHA256.
    ///
    /// Fails closed on an empty secret: a codec that silently ran with a
    /// guessable key would defeat the whole scheme.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config("auth secret is not set"));
        }
        let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        hkdf.expand(KEY_INFO, key.as_mut())
            .map_err(|_| TokenError::Config("key derivation failed"))?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, claims: &CapabilityClaims) -> Result<String, TokenError> {
        let plaintext =
            serde_json::to_vec(claims).map_err(|_| TokenError::Config("claims serialization"))?;
        self.seal(&plaintext)
    }

    pub fn decrypt(&self, token: &str) -> Result<CapabilityClaims, TokenError> {
        let plaintext = self.open(token)?;
        // Missing mandatory claim fields are an integrity failure, not a
        // distinct error: the token was not produced by this issuer.
        serde_json::from_slice(&plaintext).map_err(|_| TokenError::Integrity)
    }

    fn cipher(&self) -> Result<Aes256Gcm, TokenError> {
        Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|_| TokenError::Config("invalid key length"))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, TokenError> {
        let protected = URL_SAFE_NO_PAD.encode(PROTECTED_HEADER.as_bytes());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher()?
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: protected.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Config("encryption failed"))?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{protected}..{}.{}.{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(&sealed),
            URL_SAFE_NO_PAD.encode(&tag),
        ))
    }

    fn open(&self, token: &str) -> Result<Vec<u8>, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [protected, encrypted_key, nonce_b64, ciphertext_b64, tag_b64] = parts[..] else {
            return Err(TokenError::Integrity);
        };
        // `dir` tokens carry no wrapped key.
        if !encrypted_key.is_empty() {
            return Err(TokenError::Integrity);
        }

        let header = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|_| TokenError::Integrity)?;
        if header != PROTECTED_HEADER.as_bytes() {
            return Err(TokenError::Integrity);
        }

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| TokenError::Integrity)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(TokenError::Integrity);
        }
        let mut sealed = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| TokenError::Integrity)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| TokenError::Integrity)?;
        if tag.len() != TAG_LEN {
            return Err(TokenError::Integrity);
        }
        sealed.extend_from_slice(&tag);

        self.cipher()?
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &sealed,
                    aad: protected.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Integrity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn claims() -> CapabilityClaims {
        CapabilityClaims {
            assistant_id: "asst_abc123".to_string(),
            vector_store_id: "vs_def456".to_string(),
            user_name: "alice@example.com".to_string(),
            iat: 1_700_000_000,
        }
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            CapabilityCodec::new("").unwrap_err(),
            TokenError::Config("auth secret is not set")
        );
    }

    #[test]
    fn roundtrip_preserves_claims() {
        let codec = CapabilityCodec::new("correct horse battery staple").unwrap();
        let token = codec.encrypt(&claims()).unwrap();
        assert_eq!(codec.decrypt(&token).unwrap(), claims());
    }

    #[test]
    fn token_is_compact_jwe_shaped() {
        let codec = CapabilityCodec::new("secret").unwrap();
        let token = codec.encrypt(&claims()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[1].is_empty());
        let header = URL_SAFE_NO_PAD.decode(parts[0]).unwrap();
        assert_eq!(header, PROTECTED_HEADER.as_bytes());
    }

    #[test]
    fn wrong_secret_fails_integrity() {
        let codec = CapabilityCodec::new("secret one").unwrap();
        let other = CapabilityCodec::new("secret two").unwrap();
        let token = codec.encrypt(&claims()).unwrap();
        assert_eq!(other.decrypt(&token).unwrap_err(), TokenError::Integrity);
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let codec = CapabilityCodec::new("tamper detection secret").unwrap();
        let token = codec.encrypt(&claims()).unwrap();
        let bytes = token.as_bytes();
        for idx in 0..bytes.len() {
            for bit in 0..8 {
                let mut mutated = bytes.to_vec();
                mutated[idx] ^= 1 << bit;
                let Ok(mutated) = String::from_utf8(mutated) else {
                    continue;
                };
                if mutated == token {
                    continue;
                }
                assert!(
                    codec.decrypt(&mutated).is_err(),
                    "bit {bit} of byte {idx} went undetected"
                );
            }
        }
    }

    #[test]
    fn substituted_header_fails_integrity() {
        let codec = CapabilityCodec::new("secret").unwrap();
        let token = codec.encrypt(&claims()).unwrap();
        let downgraded = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A128GCM"}"#);
        let rest = token.split_once('.').map(|(_, rest)| rest).unwrap();
        let forged = format!("{downgraded}.{rest}");
        assert_eq!(codec.decrypt(&forged).unwrap_err(), TokenError::Integrity);
    }

    #[test]
    fn missing_mandatory_claims_fail_integrity() {
        let codec = CapabilityCodec::new("secret").unwrap();
        let token = codec.seal(br#"{"assistantId":"asst_only"}"#).unwrap();
        assert_eq!(codec.decrypt(&token).unwrap_err(), TokenError::Integrity);
    }

    #[test]
    fn garbage_tokens_fail_integrity() {
        let codec = CapabilityCodec::new("secret").unwrap();
        for garbage in ["", "a.b.c", "not a token at all", "....."] {
            assert_eq!(codec.decrypt(garbage).unwrap_err(), TokenError::Integrity);
        }
    }
}
