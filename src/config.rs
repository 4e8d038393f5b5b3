use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub tokens: TokenConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl: u64,
}

fn default_access_ttl() -> u64 {
    3600 // 1 hour
}

fn default_refresh_ttl() -> u64 {
    604800 // 7 days
}

/// TTL windows for the login correlation records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// How long a pending login may wait for the provider callback.
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl: u64,
    /// How long a completed login stays readable for the polling client.
    #[serde(default = "default_success_ttl")]
    pub success_ttl: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

fn default_pending_ttl() -> u64 {
    600 // 10 minutes
}

fn default_success_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            pending_ttl: default_pending_ttl(),
            success_ttl: default_success_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Callback URL registered with the providers.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Timeout for each provider network call, in seconds.
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout: u64,
    #[serde(default)]
    pub providers: HashMap<String, OAuthProvider>,
}

fn default_redirect_uri() -> String {
    "http://localhost:18080/callback".to_string()
}

fn default_exchange_timeout() -> u64 {
    10
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            redirect_uri: default_redirect_uri(),
            exchange_timeout: default_exchange_timeout(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthProvider {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub user_info_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_user_id_field")]
    pub user_id_field: String,
    #[serde(default = "default_email_field")]
    pub email_field: String,
    #[serde(default)]
    pub use_pkce: bool,
}

fn default_user_id_field() -> String {
    "id".to_string()
}

fn default_email_field() -> String {
    "email".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tokens: TokenConfig {
                secret: "change-me".to_string(),
                access_ttl: default_access_ttl(),
                refresh_ttl: default_refresh_ttl(),
            },
            login: LoginConfig::default(),
            oauth: OAuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("AUTH")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: Config = builder.build()?.try_deserialize()?;
        config.apply_provider_defaults();
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("AUTH")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: Config = builder.build()?.try_deserialize()?;
        config.apply_provider_defaults();
        Ok(config)
    }

    pub fn get_oauth_provider(&self, name: &str) -> Option<&OAuthProvider> {
        self.oauth.providers.get(name)
    }

    fn apply_provider_defaults(&mut self) {
        for (name, provider) in self.oauth.providers.iter_mut() {
            apply_predefined_provider_defaults(name, provider);
        }
    }
}

/// Fill in endpoint URLs and field names for the known providers, leaving
/// explicitly configured values untouched.
pub fn apply_predefined_provider_defaults(provider_name: &str, provider: &mut OAuthProvider) {
    match provider_name {
        "github" => apply_github_defaults(provider),
        "yandex" => apply_yandex_defaults(provider),
        _ => {} // Custom provider, no defaults to apply
    }
}

fn apply_github_defaults(provider: &mut OAuthProvider) {
    if provider.authorization_url.is_none() {
        provider.authorization_url = Some("https://github.com/login/oauth/authorize".to_string());
    }
    if provider.token_url.is_none() {
        provider.token_url = Some("https://github.com/login/oauth/access_token".to_string());
    }
    if provider.user_info_url.is_none() {
        provider.user_info_url = Some("https://api.github.com/user".to_string());
    }
    if provider.scopes.is_empty() {
        provider.scopes = vec!["user:email".to_string()];
    }
    provider.use_pkce = true;
}

fn apply_yandex_defaults(provider: &mut OAuthProvider) {
    if provider.authorization_url.is_none() {
        provider.authorization_url = Some("https://oauth.yandex.ru/authorize".to_string());
    }
    if provider.token_url.is_none() {
        provider.token_url = Some("https://oauth.yandex.ru/token".to_string());
    }
    if provider.user_info_url.is_none() {
        provider.user_info_url = Some("https://login.yandex.ru/info".to_string());
    }
    if provider.email_field == "email" {
        provider.email_field = "default_email".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 18080);
        assert_eq!(config.tokens.access_ttl, 3600);
        assert_eq!(config.tokens.refresh_ttl, 604800);
        assert_eq!(config.login.pending_ttl, 600);
        assert_eq!(config.login.success_ttl, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.oauth.providers.is_empty());
    }

    #[test]
    fn test_load_from_file_applies_provider_defaults() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
tokens:
  secret: file-secret
oauth:
  providers:
    github:
      client_id: gh-id
      client_secret: gh-secret
    yandex:
      client_id: ya-id
      client_secret: ya-secret
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.tokens.secret, "file-secret");

        let github = config.get_oauth_provider("github").unwrap();
        assert_eq!(
            github.authorization_url.as_deref(),
            Some("https://github.com/login/oauth/authorize")
        );
        assert_eq!(github.scopes, vec!["user:email"]);
        assert!(github.use_pkce);

        let yandex = config.get_oauth_provider("yandex").unwrap();
        assert_eq!(
            yandex.token_url.as_deref(),
            Some("https://oauth.yandex.ru/token")
        );
        assert_eq!(yandex.email_field, "default_email");
        assert!(!yandex.use_pkce);
    }

    #[test]
    fn test_explicit_urls_not_overridden() {
        let mut provider = OAuthProvider {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_url: Some("https://example.test/token".to_string()),
            user_id_field: default_user_id_field(),
            email_field: default_email_field(),
            ..Default::default()
        };
        apply_predefined_provider_defaults("github", &mut provider);
        assert_eq!(provider.token_url.as_deref(), Some("https://example.test/token"));
        assert_eq!(
            provider.user_info_url.as_deref(),
            Some("https://api.github.com/user")
        );
    }

    #[test]
    fn test_unknown_provider_gets_no_defaults() {
        let mut provider = OAuthProvider {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            user_id_field: default_user_id_field(),
            email_field: default_email_field(),
            ..Default::default()
        };
        apply_predefined_provider_defaults("gitea", &mut provider);
        assert!(provider.authorization_url.is_none());
        assert!(provider.token_url.is_none());
    }
}
