//! Health check registry and aggregation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: None,
            duration_ms: None,
        }
    }

    pub fn healthy_with_details(details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: Some(details),
            duration_ms: None,
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message),
            details: None,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A component that can report its own health.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> HealthCheckResult;
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub checks: HashMap<String, HealthCheckResult>,
}

/// Registry of named checkers; the aggregate status is the worst
/// individual status.
pub struct HealthService {
    service_name: String,
    checkers: Arc<RwLock<HashMap<String, Arc<dyn HealthChecker>>>>,
}

impl HealthService {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            checkers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, checker: Arc<dyn HealthChecker>) {
        let mut checkers = self.checkers.write().await;
        checkers.insert(checker.name().to_string(), checker);
    }

    pub async fn check_health(&self) -> HealthReport {
        let checkers = self.checkers.read().await;
        let mut checks = HashMap::new();
        let mut overall = HealthStatus::Healthy;

        for (name, checker) in checkers.iter() {
            let started = Instant::now();
            let result = checker
                .check()
                .await
                .with_duration(started.elapsed().as_millis() as u64);

            overall = match (overall, result.status) {
                (_, HealthStatus::Unhealthy) | (HealthStatus::Unhealthy, _) => {
                    HealthStatus::Unhealthy
                }
                (_, HealthStatus::Degraded) | (HealthStatus::Degraded, _) => {
                    HealthStatus::Degraded
                }
                _ => HealthStatus::Healthy,
            };
            checks.insert(name.clone(), result);
        }

        HealthReport {
            status: overall,
            service: self.service_name.clone(),
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChecker {
        name: &'static str,
        result: HealthStatus,
    }

    #[async_trait]
    impl HealthChecker for FixedChecker {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> HealthCheckResult {
            match self.result {
                HealthStatus::Healthy => HealthCheckResult::healthy(),
                _ => HealthCheckResult::unhealthy("down".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_service_is_healthy() {
        let service = HealthService::new("auth-broker");
        let report = service.check_health().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.checks.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_takes_worst_status() {
        let service = HealthService::new("auth-broker");
        service
            .register(Arc::new(FixedChecker {
                name: "ok",
                result: HealthStatus::Healthy,
            }))
            .await;
        service
            .register(Arc::new(FixedChecker {
                name: "broken",
                result: HealthStatus::Unhealthy,
            }))
            .await;

        let report = service.check_health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks["broken"].duration_ms.is_some());
    }
}
