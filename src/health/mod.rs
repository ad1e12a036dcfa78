//! Health verification run after the last phase.
//!
//! Two contracts:
//! - [`HealthVerifier::wait_for_healthy`] holds one critical endpoint to a
//!   consecutive-pass requirement. Any failed poll resets the streak to zero.
//! - [`HealthVerifier::check_services`] checks a batch of dependencies, each
//!   with ordinary bounded retries (first pass wins).

pub mod probe;

pub use probe::{HealthTarget, ProbeSource};

use crate::config::{HealthSection, ServiceCheck};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pass/fail signal for a target. The transport is up to the implementation.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn check(&self, target: &HealthTarget) -> bool;
}

/// One poll of the critical endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPollResult {
    pub attempt: u32,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    /// Streak length after this poll.
    pub consecutive: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Success { attempts: u32 },
    Exhausted { attempts: u32, best_streak: u32 },
}

impl HealthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HealthOutcome::Success { .. })
    }
}

/// Result of a bounded-retry dependency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub name: String,
    pub passed: bool,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct HealthVerifier {
    pub required_consecutive: u32,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl HealthVerifier {
    /// A streak shorter than one pass is treated as one.
    pub fn new(required_consecutive: u32, interval: Duration, max_attempts: u32) -> Self {
        Self {
            required_consecutive: required_consecutive.max(1),
            interval,
            max_attempts,
        }
    }

    pub fn from_config(section: &HealthSection) -> Self {
        Self::new(
            section.required_consecutive,
            section.interval(),
            section.max_attempts,
        )
    }

    /// Poll `target` until `required_consecutive` passes in a row, or give up
    /// after `max_attempts`. Returns as soon as the threshold is reached.
    pub async fn wait_for_healthy(
        &self,
        source: &dyn HealthSource,
        target: &HealthTarget,
        mut on_poll: impl FnMut(&HealthPollResult),
    ) -> HealthOutcome {
        let mut consecutive = 0u32;
        let mut best_streak = 0u32;

        for attempt in 1..=self.max_attempts {
            let passed = source.check(target).await;
            consecutive = if passed { consecutive + 1 } else { 0 };
            best_streak = best_streak.max(consecutive);

            let poll = HealthPollResult {
                attempt,
                passed,
                timestamp: Utc::now(),
                consecutive,
            };
            debug!(attempt, passed, consecutive, "Health poll");
            on_poll(&poll);

            if consecutive >= self.required_consecutive {
                info!(%target, attempts = attempt, "Endpoint healthy");
                return HealthOutcome::Success { attempts: attempt };
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(%target, attempts = self.max_attempts, best_streak, "Endpoint never became healthy");
        HealthOutcome::Exhausted {
            attempts: self.max_attempts,
            best_streak,
        }
    }

    /// Check each service independently with up to `retries` attempts.
    pub async fn check_services(
        &self,
        source: &dyn HealthSource,
        services: &[ServiceCheck],
    ) -> Vec<ServiceReport> {
        let mut reports = Vec::with_capacity(services.len());
        for service in services {
            let mut report = ServiceReport {
                name: service.name.clone(),
                passed: false,
                attempts: 0,
            };
            for attempt in 1..=service.retries {
                report.attempts = attempt;
                if source.check(&service.target).await {
                    report.passed = true;
                    break;
                }
                if attempt < service.retries {
                    tokio::time::sleep(self.interval).await;
                }
            }
            if report.passed {
                debug!(service = %report.name, attempts = report.attempts, "Service healthy");
            } else {
                warn!(service = %report.name, attempts = report.attempts, "Service unhealthy");
            }
            reports.push(report);
        }
        reports
    }
}
