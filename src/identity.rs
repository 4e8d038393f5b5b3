use crate::config::OAuthProvider;
use crate::correlation::LoginProvider;
use crate::error::AuthError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Normalized identity returned by a provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: LoginProvider,
    pub provider_user_id: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// Exchanges a provider authorization code for a normalized identity.
///
/// Implementations must never retry the exchange: authorization codes are
/// single-use, so a second attempt with the same code is guaranteed to fail.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn exchange_and_fetch(
        &self,
        provider: LoginProvider,
        settings: &OAuthProvider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, AuthError>;
}

/// Production resolver performing two bounded-timeout HTTP calls: the
/// authorization-code exchange, then the profile fetch.
pub struct HttpIdentityResolver {
    http_client: reqwest::Client,
    redirect_uri: String,
}

impl HttpIdentityResolver {
    pub fn new(redirect_uri: String, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            // Token endpoints must not be reached through redirects.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Internal(format!("http client build error: {e}")))?;

        Ok(Self {
            http_client,
            redirect_uri,
        })
    }

    async fn exchange_code(
        &self,
        settings: &OAuthProvider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<String, AuthError> {
        let token_url = settings
            .token_url
            .as_deref()
            .ok_or_else(|| AuthError::Internal("token URL not configured".to_string()))?;

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &settings.client_id),
            ("client_secret", &settings.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self
            .http_client
            .post(token_url)
            // GitHub answers with urlencoded bodies unless JSON is requested.
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("token request: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderExchangeFailed(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: HashMap<String, Value> = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("token response: {e}")))?;

        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                AuthError::ProviderExchangeFailed("no access_token in response".to_string())
            })
    }

    async fn fetch_profile(
        &self,
        provider: LoginProvider,
        settings: &OAuthProvider,
        access_token: &str,
    ) -> Result<ExternalIdentity, AuthError> {
        let user_info_url = settings
            .user_info_url
            .as_deref()
            .ok_or_else(|| AuthError::Internal("user info URL not configured".to_string()))?;

        let response = self
            .http_client
            .get(user_info_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "auth-broker")
            .send()
            .await
            .map_err(|e| AuthError::ProviderProfileInvalid(format!("profile request: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::ProviderProfileInvalid(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }

        let profile: HashMap<String, Value> = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderProfileInvalid(format!("profile response: {e}")))?;

        let provider_user_id = stable_id(profile.get(&settings.user_id_field)).ok_or_else(|| {
            AuthError::ProviderProfileInvalid(format!(
                "no stable id in field {:?}",
                settings.user_id_field
            ))
        })?;

        let display_name = profile
            .get("name")
            .or_else(|| profile.get("display_name"))
            .or_else(|| profile.get("login"))
            .and_then(|v| v.as_str())
            .unwrap_or(&provider_user_id)
            .to_string();

        let email = profile
            .get(&settings.email_field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(ExternalIdentity {
            provider,
            provider_user_id,
            display_name,
            email,
        })
    }
}

/// Providers disagree on id types: GitHub sends a number, Yandex a string.
fn stable_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn exchange_and_fetch(
        &self,
        provider: LoginProvider,
        settings: &OAuthProvider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, AuthError> {
        let access_token = self.exchange_code(settings, code, code_verifier).await?;
        self.fetch_profile(provider, settings, &access_token).await
    }
}
