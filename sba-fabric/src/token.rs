//! OAuth2-style bearer tokens issued by the registry.
//!
//! HS256 (HMAC-SHA-256) over a process-local key that rotates on every boot.
//! This is the toy token service the fabric needs for its management and
//! discovery surfaces, not a model of a real authorization server: there is
//! exactly `issue(scope) → token` and `verify(token) → claims`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac as _};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_SCOPE: &str = "nnrf-nfm nnrf-disc";
pub const DEFAULT_VALIDITY_SECS: i64 = 3600;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not a three-part JWS compact serialization")]
    Malformed,
    #[error("unsupported JWS header (only HS256 is accepted)")]
    UnsupportedHeader,
    #[error("signature verification failed")]
    BadSignature,
    #[error("token expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Client the token was issued to.
    pub sub: String,
    /// Issuing NRF instance id.
    pub iss: Uuid,
    /// Always `"nrf"`.
    pub aud: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Deserialize)]
struct Header<'a> {
    alg: &'a str,
    typ: &'a str,
}

/// Issues and verifies the registry's bearer tokens.
pub struct TokenSigner {
    issuer: Uuid,
    key: [u8; 32],
}

impl TokenSigner {
    pub fn new(issuer: Uuid) -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        TokenSigner { issuer, key }
    }

    pub fn issue(&self, sub: &str, scope: Option<&str>, validity_secs: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: sub.to_owned(),
            iss: self.issuer,
            aud: "nrf".to_owned(),
            scope: scope.unwrap_or(DEFAULT_SCOPE).to_owned(),
            iat: now,
            exp: now + validity_secs,
        };

        let header = serde_json::to_vec(&Header {
            alg: "HS256",
            typ: "JWT",
        })
        .expect("static header serializes");
        let payload = serde_json::to_vec(&claims).expect("claims hold only JSON-safe fields");

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.sign(signing_input.as_bytes());

        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).map_err(|_| TokenError::Malformed)?;
        let header: Header<'_> = serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedHeader);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if now > claims.exp {
            return Err(TokenError::Expired { exp: claims.exp, now });
        }

        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn issued_token_verifies() {
        let signer = TokenSigner::new(Uuid::new_v4());
        let token = signer.issue("nf-client-1", Some("nnrf-disc"), 60);

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "nf-client-1");
        assert_eq!(claims.aud, "nrf");
        assert_eq!(claims.scope, "nnrf-disc");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let issuer = Uuid::new_v4();
        let signer = TokenSigner::new(issuer);
        let other = TokenSigner::new(issuer);

        let token = signer.issue("nf-client-1", None, 60);
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new(Uuid::new_v4());
        let token = signer.issue("nf-client-1", None, -1);

        assert!(matches!(signer.verify(&token), Err(TokenError::Expired { .. })));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = TokenSigner::new(Uuid::new_v4());
        let token = signer.issue("nf-client-1", None, 60);

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"intruder"}"#);
        parts[1] = &forged;
        let forged_token = parts.join(".");

        assert!(signer.verify(&forged_token).is_err());
    }
}
