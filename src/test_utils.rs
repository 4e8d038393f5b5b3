use crate::{
    config::{Config, OAuthProvider, apply_predefined_provider_defaults},
    correlation::LoginProvider,
    error::AuthError,
    identity::{ExternalIdentity, IdentityResolver},
    server::Server,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Config with github and yandex wired up the way a deployment would
/// configure them, minus real credentials.
pub fn test_config_with_providers() -> Config {
    let mut config = Config::default();
    config.tokens.secret = "test-secret".to_string();

    for name in ["github", "yandex"] {
        let mut provider = OAuthProvider {
            client_id: format!("{name}-client"),
            client_secret: format!("{name}-secret"),
            user_id_field: "id".to_string(),
            email_field: "email".to_string(),
            ..Default::default()
        };
        apply_predefined_provider_defaults(name, &mut provider);
        config.oauth.providers.insert(name.to_string(), provider);
    }

    config
}

/// Identity resolver returning a canned identity or a canned failure, so
/// tests can drive the callback path without a provider.
pub struct StubIdentityResolver {
    result: Result<ExternalIdentity, String>,
}

impl StubIdentityResolver {
    pub fn returning(identity: ExternalIdentity) -> Self {
        Self {
            result: Ok(identity),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err("stubbed exchange failure".to_string()),
        }
    }
}

#[async_trait]
impl IdentityResolver for StubIdentityResolver {
    async fn exchange_and_fetch(
        &self,
        provider: LoginProvider,
        _settings: &OAuthProvider,
        _code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, AuthError> {
        match &self.result {
            Ok(identity) => Ok(ExternalIdentity {
                provider,
                ..identity.clone()
            }),
            Err(message) => Err(AuthError::ProviderExchangeFailed(message.clone())),
        }
    }
}

/// Test server builder wiring a stub resolver by default.
pub struct TestServerBuilder {
    config: Config,
    resolver: Arc<dyn IdentityResolver>,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config_with_providers(),
            resolver: Arc::new(StubIdentityResolver::returning(ExternalIdentity {
                provider: LoginProvider::Github,
                provider_user_id: "42".to_string(),
                display_name: "Ann".to_string(),
                email: Some("ann@example.com".to_string()),
            })),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn build(self) -> Server {
        Server::with_resolver(self.config, self.resolver)
            .await
            .unwrap()
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
