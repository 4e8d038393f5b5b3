use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::health::{HealthCheckResult, HealthChecker};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Reserved payload field separator; subjects containing it are rejected.
pub const FIELD_DELIMITER: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub kind: TokenKind,
    pub issued_at: i64,
}

/// Creates and validates self-contained signed bearer tokens.
///
/// Wire format: `b64url(subject|kind|issued_at) "." b64url(hmac_sha256)`.
/// The per-kind TTL comes from configuration, never from the token itself,
/// so a tampered lifetime cannot extend validity. Stateless; safe to share.
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    access_ttl: u64,
    refresh_ttl: u64,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn create(&self, subject: &str, kind: TokenKind) -> Result<String, AuthError> {
        if subject.contains(FIELD_DELIMITER) {
            return Err(AuthError::MalformedSubject);
        }

        let issued_at = Utc::now().timestamp();
        let payload = format!("{subject}{FIELD_DELIMITER}{kind}{FIELD_DELIMITER}{issued_at}");
        let signature = self.sign(payload.as_bytes())?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    pub fn validate(&self, token: &str, expected_kind: TokenKind) -> Result<Claims, AuthError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(AuthError::MalformedToken)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::MalformedToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::MalformedToken)?;

        // Signature check comes first; payload contents are untrusted until
        // the MAC matches. verify_slice compares in constant time.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AuthError::Internal("invalid signing key".to_string()))?;
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let payload = String::from_utf8(payload).map_err(|_| AuthError::MalformedToken)?;
        let mut fields = payload.splitn(3, FIELD_DELIMITER);
        let subject = fields.next().ok_or(AuthError::MalformedToken)?;
        let kind = fields
            .next()
            .and_then(TokenKind::parse)
            .ok_or(AuthError::MalformedToken)?;
        let issued_at: i64 = fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or(AuthError::MalformedToken)?;

        if kind != expected_kind {
            return Err(AuthError::KindMismatch);
        }

        if Utc::now().timestamp() > issued_at + self.ttl(kind) as i64 {
            return Err(AuthError::TokenExpired);
        }

        Ok(Claims {
            subject: subject.to_string(),
            kind,
            issued_at,
        })
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    fn ttl(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AuthError::Internal("invalid signing key".to_string()))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    pub fn health_checker(&self) -> Arc<TokenCodecHealthChecker> {
        Arc::new(TokenCodecHealthChecker {
            codec: self.clone(),
        })
    }
}

/// Health checker that round-trips a throwaway token through the codec.
pub struct TokenCodecHealthChecker {
    codec: TokenCodec,
}

#[async_trait::async_trait]
impl HealthChecker for TokenCodecHealthChecker {
    fn name(&self) -> &str {
        "token_codec"
    }

    async fn check(&self) -> HealthCheckResult {
        let token = match self.codec.create("health-check", TokenKind::Access) {
            Ok(token) => token,
            Err(err) => {
                return HealthCheckResult::unhealthy(format!("token creation failed: {err}"));
            }
        };

        match self.codec.validate(&token, TokenKind::Access) {
            Ok(claims) if claims.subject == "health-check" => {
                HealthCheckResult::healthy_with_details(serde_json::json!({
                    "token_creation": "success",
                    "token_validation": "success",
                }))
            }
            Ok(_) => HealthCheckResult::unhealthy("validation returned wrong subject".to_string()),
            Err(err) => HealthCheckResult::unhealthy(format!("token validation failed: {err}")),
        }
    }
}
