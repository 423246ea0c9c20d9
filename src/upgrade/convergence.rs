use std::time::Duration;

use super::{SharedService, Upgrader};
use crate::rancher::model::ServiceState;

/// Timing of the convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradePolicy {
    /// Wait before the first read. Rancher keeps reporting `active` for a
    /// while after an upgrade was accepted.
    pub settle_delay: Duration,
    /// Wait between two reads while the service is still rolling.
    pub retry_delay: Duration,
    pub max_attempts: u32,
    /// Wait before the last, unconditional refresh.
    pub final_delay: Duration,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        UpgradePolicy {
            settle_delay: Duration::from_secs(120),
            retry_delay: Duration::from_secs(30),
            max_attempts: 5,
            final_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    /// The service is back to `active`, or its upgrade was finished.
    Converged,
    /// Every attempt was spent without reaching a terminal state.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub outcome: ConvergenceOutcome,
    /// Reads made before the final refresh.
    pub attempts: u32,
}

impl Upgrader {
    /// Drive a service whose upgrade was just requested to a terminal state.
    ///
    /// Always ends with one last refresh so the cached record is as fresh
    /// as possible for the next event. Never fails: anything that goes
    /// wrong is logged and the service is left in whatever state Rancher
    /// reports. An upgrade left in `upgraded` is picked up by the next
    /// directory rebuild.
    pub async fn converge(&self, service: &SharedService) -> Convergence {
        let policy = *self.policy();
        let id = service.lock().await.id.clone();

        tokio::time::sleep(policy.settle_delay).await;

        let mut convergence = Convergence {
            outcome: ConvergenceOutcome::Exhausted,
            attempts: 0,
        };

        for attempt in 1..=policy.max_attempts {
            convergence.attempts = attempt;
            self.refresh(service).await;
            let state = service.lock().await.state.clone();

            match state {
                ServiceState::Upgraded => {
                    if self.finish(service).await {
                        convergence.outcome = ConvergenceOutcome::Converged;
                        break;
                    }
                    log::warn!(
                        "Finishing upgrade of {id} failed (attempt {attempt}/{})",
                        policy.max_attempts
                    );
                }
                ServiceState::Active => {
                    log::info!("Service {id} active");
                    convergence.outcome = ConvergenceOutcome::Converged;
                    break;
                }
                state => {
                    log::info!(
                        "Service {id} still {state}. Retrying in {} seconds...",
                        policy.retry_delay.as_secs()
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
        }

        if convergence.outcome == ConvergenceOutcome::Exhausted {
            log::warn!(
                "Service {id} did not converge after {} attempts",
                convergence.attempts
            );
        }

        tokio::time::sleep(policy.final_delay).await;
        self.refresh(service).await;

        convergence
    }
}
