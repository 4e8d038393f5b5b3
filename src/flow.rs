//! Login flow controller: ties the correlation store, the token codec, the
//! identity resolver and the user repository together across the
//! redirect/callback/poll cycle.

use crate::config::{Config, OAuthProvider};
use crate::correlation::{
    CorrelationRecord, CorrelationStore, LoginProvider, LoginStatus,
};
use crate::error::AuthError;
use crate::identity::{ExternalIdentity, IdentityResolver};
use crate::token::{TokenCodec, TokenKind};
use crate::users::UserRepository;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const PKCE_VERIFIER_LENGTH: usize = 43;
const DIRECT_CODE_LENGTH: usize = 6;

/// Outcome of `start_login`: either a provider redirect or a numeric code
/// the user enters in the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLogin {
    Redirect(String),
    DirectCode(String),
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

pub struct LoginFlow {
    config: Arc<Config>,
    codec: TokenCodec,
    store: Arc<CorrelationStore>,
    resolver: Arc<dyn IdentityResolver>,
    users: Arc<dyn UserRepository>,
}

impl LoginFlow {
    pub fn new(
        config: Arc<Config>,
        store: Arc<CorrelationStore>,
        resolver: Arc<dyn IdentityResolver>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        let codec = TokenCodec::new(&config.tokens);
        Self {
            config,
            codec,
            store,
            resolver,
            users,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Registers a pending login under the client-held `client_token` and
    /// returns either the provider redirect URL or a direct login code.
    pub async fn start_login(
        &self,
        client_token: &str,
        login_type: &str,
    ) -> Result<StartLogin, AuthError> {
        let provider = LoginProvider::from_login_type(login_type)
            .ok_or_else(|| AuthError::BadRequest(format!("unknown login type: {login_type}")))?;
        let pending_ttl = Duration::from_secs(self.config.login.pending_ttl);

        if provider == LoginProvider::DirectCode {
            let code = generate_direct_code();
            let record =
                CorrelationRecord::pending(provider).with_login_code(code.clone());
            self.store.insert(client_token, record, pending_ttl).await;
            tracing::debug!(provider = provider.as_str(), "direct-code login started");
            return Ok(StartLogin::DirectCode(code));
        }

        let settings = self
            .config
            .get_oauth_provider(provider.as_str())
            .ok_or_else(|| {
                AuthError::BadRequest(format!("provider not configured: {}", provider.as_str()))
            })?;

        let mut record = CorrelationRecord::pending(provider);
        let mut verifier = None;
        if settings.use_pkce {
            let v = generate_pkce_verifier();
            record = record.with_code_verifier(v.clone());
            verifier = Some(v);
        }

        let url = self.build_authorize_url(settings, client_token, verifier.as_deref())?;
        self.store.insert(client_token, record, pending_ttl).await;
        tracing::debug!(provider = provider.as_str(), "login redirect issued");

        Ok(StartLogin::Redirect(url))
    }

    /// Handles the provider callback: consumes the pending record exactly
    /// once, resolves the identity (outside any store lock), resolves the
    /// account and publishes the issued token pair.
    pub async fn handle_callback(
        &self,
        provider_code: &str,
        client_token: &str,
    ) -> Result<(), AuthError> {
        let record = self
            .store
            .consume_once(client_token)
            .await
            .ok_or(AuthError::UnknownCorrelationState)?;

        let identity = match record.provider {
            LoginProvider::DirectCode => {
                // A wrong code must look exactly like an unknown handle.
                if record.login_code.as_deref() != Some(provider_code) {
                    return Err(AuthError::UnknownCorrelationState);
                }
                ExternalIdentity {
                    provider: LoginProvider::DirectCode,
                    provider_user_id: client_token.to_string(),
                    display_name: "direct login".to_string(),
                    email: None,
                }
            }
            provider => {
                let settings = self
                    .config
                    .get_oauth_provider(provider.as_str())
                    .ok_or_else(|| {
                        AuthError::Internal(format!(
                            "provider no longer configured: {}",
                            provider.as_str()
                        ))
                    })?;
                self.resolver
                    .exchange_and_fetch(
                        provider,
                        settings,
                        provider_code,
                        record.code_verifier.as_deref(),
                    )
                    .await?
            }
        };

        let account = match self
            .users
            .find_by_external_id(identity.provider, &identity.provider_user_id)
            .await
        {
            Some(account) => account,
            None => self.users.create_from_identity(&identity).await,
        };

        if self.users.is_blocked(&account).await {
            tracing::info!(account_id = account.id, "blocked account refused login");
            return Err(AuthError::AccountBlocked);
        }

        let subject = account.id.to_string();
        let access_token = self.codec.create(&subject, TokenKind::Access)?;
        let refresh_token = self.codec.create(&subject, TokenKind::Refresh)?;

        let success_ttl = Duration::from_secs(self.config.login.success_ttl);
        let stored = self
            .store
            .transition_to_success(client_token, access_token, refresh_token, success_ttl)
            .await;
        if !stored {
            return Err(AuthError::UnknownCorrelationState);
        }

        tracing::info!(
            account_id = account.id,
            provider = identity.provider.as_str(),
            "login completed"
        );
        Ok(())
    }

    /// Polling endpoint. Not-found and aged-out are both reported as
    /// `expired`; the distinction would leak which handles ever existed.
    pub async fn check(&self, client_token: &str) -> CheckResponse {
        match self.store.get(client_token).await {
            Some(record) => match record.status {
                LoginStatus::Pending => CheckResponse {
                    status: "pending",
                    access_token: None,
                    refresh_token: None,
                },
                LoginStatus::Success => CheckResponse {
                    status: "success",
                    access_token: record.access_token,
                    refresh_token: record.refresh_token,
                },
            },
            None => CheckResponse {
                status: "expired",
                access_token: None,
                refresh_token: None,
            },
        }
    }

    /// Mints a fresh access/refresh pair for the subject of a valid
    /// refresh token. The old refresh token stays valid until its TTL.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, AuthError> {
        let claims = self.codec.validate(refresh_token, TokenKind::Refresh)?;

        let access_token = self.codec.create(&claims.subject, TokenKind::Access)?;
        let refresh_token = self.codec.create(&claims.subject, TokenKind::Refresh)?;

        Ok(TokenPairResponse {
            access_token,
            refresh_token,
            expires_in: self.codec.access_ttl(),
        })
    }

    /// Access-token introspection; validation failures are recovered into
    /// `valid: false` rather than surfaced.
    pub fn verify(&self, access_token: &str) -> VerifyResponse {
        match self.codec.validate(access_token, TokenKind::Access) {
            Ok(claims) => VerifyResponse {
                valid: true,
                user_id: Some(claims.subject),
            },
            Err(err) => {
                tracing::debug!(error = %err, "access token rejected");
                VerifyResponse {
                    valid: false,
                    user_id: None,
                }
            }
        }
    }

    fn build_authorize_url(
        &self,
        settings: &OAuthProvider,
        client_token: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, AuthError> {
        let authorization_url = settings.authorization_url.as_deref().ok_or_else(|| {
            AuthError::Internal("authorization URL not configured".to_string())
        })?;

        let mut url = Url::parse(authorization_url)
            .map_err(|e| AuthError::Internal(format!("invalid authorization URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &settings.client_id);
            query.append_pair("redirect_uri", &self.config.oauth.redirect_uri);
            if !settings.scopes.is_empty() {
                query.append_pair("scope", &settings.scopes.join(" "));
            }
            query.append_pair("state", client_token);
            if let Some(verifier) = code_verifier {
                query.append_pair("code_challenge", &pkce_challenge(verifier));
                query.append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url.to_string())
    }
}

fn generate_pkce_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PKCE_VERIFIER_LENGTH)
        .map(char::from)
        .collect()
}

/// S256: base64url-encoded SHA-256 digest of the verifier.
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn generate_direct_code() -> String {
    let mut rng = rand::rng();
    (0..DIRECT_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10)))
        .collect()
}
