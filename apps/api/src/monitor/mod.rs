//! Health aggregation over the sibling services listed in `MONITOR_TARGETS`.

pub mod handlers;

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::MonitorTarget;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    Down,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub key: String,
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub error: Option<String>,
    pub response_time_ms: Option<f64>,
    pub last_check: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total_services: usize,
    pub healthy_services: usize,
    pub unhealthy_services: usize,
    pub health_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub services: Vec<ServiceHealth>,
    pub summary: HealthSummary,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Clone)]
pub struct HealthMonitor {
    client: reqwest::Client,
    targets: Vec<MonitorTarget>,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(client: reqwest::Client, targets: Vec<MonitorTarget>) -> Self {
        Self {
            client,
            targets,
            timeout: CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn targets(&self) -> &[MonitorTarget] {
        &self.targets
    }

    /// Polls every target concurrently.
    pub async fn check_all(&self) -> HealthReport {
        let services = join_all(self.targets.iter().map(|t| self.check(t))).await;

        let total = services.len();
        let healthy = services
            .iter()
            .filter(|s| s.status == ServiceStatus::Healthy)
            .count();

        let status = match (total, healthy) {
            (0, _) => "unknown",
            (t, h) if t == h => "healthy",
            (_, 0) => "unhealthy",
            _ => "partial",
        };
        let health_percentage = if total == 0 {
            0.0
        } else {
            round_to(healthy as f64 / total as f64 * 100.0, 1)
        };

        HealthReport {
            status,
            timestamp: Utc::now().to_rfc3339(),
            services,
            summary: HealthSummary {
                total_services: total,
                healthy_services: healthy,
                unhealthy_services: total - healthy,
                health_percentage,
            },
        }
    }

    pub async fn check(&self, target: &MonitorTarget) -> ServiceHealth {
        let started = Instant::now();
        let result = self
            .client
            .get(&target.url)
            .timeout(self.timeout)
            .send()
            .await;
        let elapsed_ms = round_to(started.elapsed().as_secs_f64() * 1000.0, 2);

        let (status, error, response_time_ms) = match result {
            Ok(response) if response.status().as_u16() == 200 => {
                debug!("{}: healthy ({elapsed_ms}ms)", target.name);
                (ServiceStatus::Healthy, None, Some(elapsed_ms))
            }
            Ok(response) => {
                warn!("{}: unhealthy, HTTP {}", target.name, response.status().as_u16());
                (
                    ServiceStatus::Unhealthy,
                    Some(format!("HTTP {}", response.status().as_u16())),
                    Some(elapsed_ms),
                )
            }
            Err(e) if e.is_timeout() => {
                warn!("{}: timeout", target.name);
                (
                    ServiceStatus::Timeout,
                    Some(format!("Request timeout (>{}s)", self.timeout.as_secs_f64())),
                    None,
                )
            }
            Err(e) if e.is_connect() => {
                warn!("{}: connection refused", target.name);
                (
                    ServiceStatus::Down,
                    Some("Connection refused - service may be starting".to_string()),
                    None,
                )
            }
            Err(e) => {
                error!("{}: {e}", target.name);
                (ServiceStatus::Error, Some(e.to_string()), None)
            }
        };

        ServiceHealth {
            key: target.key.clone(),
            name: target.name.clone(),
            url: target.url.clone(),
            status,
            error,
            response_time_ms,
            last_check: Utc::now().to_rfc3339(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{closed_port, spawn_sibling, target};
    use super::*;

    #[tokio::test]
    async fn test_no_targets_is_unknown() {
        let report = HealthMonitor::new(reqwest::Client::new(), vec![]).check_all().await;
        assert_eq!(report.status, "unknown");
        assert_eq!(report.summary.health_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_classifies_each_outcome() {
        let sibling = spawn_sibling().await;
        let closed = closed_port().await;
        let monitor = HealthMonitor::new(
            reqwest::Client::new(),
            vec![
                target("ok", format!("http://{sibling}/ok")),
                target("broken", format!("http://{sibling}/broken")),
                target("slow", format!("http://{sibling}/slow")),
                target("gone", format!("http://{closed}/health")),
            ],
        )
        .with_timeout(Duration::from_millis(300));

        let report = monitor.check_all().await;
        let statuses: Vec<ServiceStatus> = report.services.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                ServiceStatus::Healthy,
                ServiceStatus::Unhealthy,
                ServiceStatus::Timeout,
                ServiceStatus::Down
            ]
        );
        assert_eq!(report.services[1].error.as_deref(), Some("HTTP 500"));
        assert!(report.services[0].response_time_ms.is_some());
        assert!(report.services[3].response_time_ms.is_none());

        assert_eq!(report.status, "partial");
        assert_eq!(report.summary.healthy_services, 1);
        assert_eq!(report.summary.health_percentage, 25.0);
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let sibling = spawn_sibling().await;
        let monitor = HealthMonitor::new(
            reqwest::Client::new(),
            vec![target("a", format!("http://{sibling}/ok")), target("b", format!("http://{sibling}/ok"))],
        );
        let report = monitor.check_all().await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.summary.health_percentage, 100.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }
}
