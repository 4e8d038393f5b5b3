use crate::{
    config::Config,
    correlation::CorrelationStore,
    error::AuthError,
    flow::LoginFlow,
    health::HealthService,
    identity::{HttpIdentityResolver, IdentityResolver},
    routes::{create_health_routes, create_login_routes, create_token_routes},
    users::{MemoryUserRepository, UserRepository},
};
use axum::Router;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub flow: Arc<LoginFlow>,
    pub store: Arc<CorrelationStore>,
    pub users: Arc<MemoryUserRepository>,
    pub health_service: Arc<HealthService>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AuthError> {
        let resolver = Arc::new(HttpIdentityResolver::new(
            config.oauth.redirect_uri.clone(),
            Duration::from_secs(config.oauth.exchange_timeout),
        )?);
        Self::with_resolver(config, resolver).await
    }

    /// Wires the server around an injected identity resolver; tests swap in
    /// a stub here.
    pub async fn with_resolver(
        config: Config,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self, AuthError> {
        let config = Arc::new(config);
        let store = Arc::new(CorrelationStore::new());
        let users = Arc::new(MemoryUserRepository::new());

        let flow = Arc::new(LoginFlow::new(
            config.clone(),
            store.clone(),
            resolver,
            users.clone() as Arc<dyn UserRepository>,
        ));

        let health_service = Arc::new(HealthService::new("auth-broker"));
        health_service.register(flow.codec().health_checker()).await;
        health_service.register(store.health_checker()).await;

        Ok(Self {
            config,
            flow,
            store,
            users,
            health_service,
        })
    }

    pub async fn run(&self) -> Result<(), AuthError> {
        self.store
            .spawn_sweeper(Duration::from_secs(self.config.login.sweep_interval));

        let app = self.create_app();
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::Internal(format!("failed to bind {addr}: {e}")))?;

        info!("listening on http://{addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AuthError::Internal(format!("server error: {e}")))?;

        info!("server shutdown complete");
        Ok(())
    }

    pub fn create_app(&self) -> Router {
        Router::new()
            .merge(create_login_routes())
            .merge(create_token_routes())
            .merge(create_health_routes())
            .with_state(self.clone())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    } else {
        info!("shutdown signal received");
    }
}
