//! Upgrade orchestration against Rancher.
//!
//! [`Upgrader`] holds the single-step operations: refreshing a cached
//! service, submitting an in-service upgrade and finishing it. The
//! background convergence loop lives in [`convergence`], the entry point
//! used by the webhook in [`redeploy`].

use std::sync::Arc;
use tokio::sync::Mutex;

pub mod convergence;
pub mod flight;
pub mod redeploy;

use crate::rancher::Platform;
use crate::rancher::model::{Action, Service, ServiceState, UpgradeRequest};
use convergence::UpgradePolicy;
use flight::{FlightGuard, InFlight};

/// A cached service record shared between the directory, the webhook path
/// and background convergence loops. Never locked across an `.await`.
pub type SharedService = Arc<Mutex<Service>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The upgrade action was accepted by Rancher.
    Submitted,
    /// The service was sitting in `upgraded`, it got finished instead.
    Finalized,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("no service runs this image")]
    NotFound,
    #[error("an upgrade of this service is already in progress")]
    Busy,
    #[error("service is `{0}`, only active services can be upgraded")]
    NotActive(ServiceState),
    #[error("the `{0}` action is not available")]
    MissingAction(Action),
    #[error("service has no launch config")]
    MissingLaunchConfig,
    #[error("finishing the pending upgrade failed")]
    FinalizeFailed,
    #[error("Rancher call failed: {0}")]
    Platform(String),
}

impl UpgradeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UpgradeOutcome::Submitted => "submitted",
            UpgradeOutcome::Finalized => "finalized",
            UpgradeOutcome::Rejected(_) => "rejected",
        }
    }
}

#[derive(Clone)]
pub struct Upgrader {
    platform: Arc<dyn Platform>,
    policy: UpgradePolicy,
    in_flight: Arc<InFlight>,
}

impl Upgrader {
    pub fn new(platform: Arc<dyn Platform>, policy: UpgradePolicy) -> Self {
        Upgrader {
            platform,
            policy,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn policy(&self) -> &UpgradePolicy {
        &self.policy
    }

    /// Reserve a service for one upgrade. `None` while another holds it.
    pub fn claim(&self, id: &str) -> Option<FlightGuard> {
        self.in_flight.claim(id)
    }

    /// Re-read the service from Rancher and merge its state and actions.
    ///
    /// Failures leave the cached record untouched; callers see no change
    /// and apply their own retry policy.
    pub async fn refresh(&self, service: &SharedService) {
        let id = service.lock().await.id.clone();

        let current = match self.platform.get_service(&id).await {
            Ok(current) => current,
            Err(e) => {
                log::warn!("Unable to refresh service {id}: {e}");
                return;
            }
        };

        let mut cached = service.lock().await;
        if cached.state != current.state {
            log::info!(
                "Service {id} changed state from `{}` to `{}`",
                cached.state,
                current.state
            );
            cached.apply(current.status());
        }
    }

    /// Submit an in-service upgrade of `service` to `image_uuid`.
    ///
    /// Returns as soon as Rancher has answered; waiting for the rollout is
    /// left to [`Upgrader::converge`].
    pub async fn upgrade(&self, service: &SharedService, image_uuid: &str) -> UpgradeOutcome {
        let snapshot = service.lock().await.clone();
        let id = &snapshot.id;

        match &snapshot.state {
            ServiceState::Active => {}
            ServiceState::Upgraded => {
                log::info!("Service {id} upgraded, finishing upgrade");
                return match self.finish(service).await {
                    true => UpgradeOutcome::Finalized,
                    false => UpgradeOutcome::Rejected(RejectReason::FinalizeFailed),
                };
            }
            state => {
                log::info!("Service {id} not in active state ({state}), canceling upgrade");
                return UpgradeOutcome::Rejected(RejectReason::NotActive(state.clone()));
            }
        }

        let Some(url) = snapshot.actions.get(Action::Upgrade) else {
            log::warn!("Service {id} is active but offers no upgrade action");
            return UpgradeOutcome::Rejected(RejectReason::MissingAction(Action::Upgrade));
        };
        let Some(launch_config) = &snapshot.launch_config else {
            log::warn!("Service {id} has no launch config to upgrade");
            return UpgradeOutcome::Rejected(RejectReason::MissingLaunchConfig);
        };

        let request = UpgradeRequest::in_service(launch_config.with_image(image_uuid));
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Unable to encode upgrade request for {id}: {e}");
                return UpgradeOutcome::Rejected(RejectReason::Platform(e.to_string()));
            }
        };

        // Local hint only. The next refresh reflects what Rancher really runs.
        if let Some(config) = service.lock().await.launch_config.as_mut() {
            config.image_uuid = image_uuid.to_string();
        }

        match self.platform.invoke_action(url, &body).await {
            Ok(response) if response.state == ServiceState::Upgrading => {
                log::info!("Upgrading {id} to {image_uuid}");
                UpgradeOutcome::Submitted
            }
            Ok(response) => {
                log::warn!(
                    "Upgrade of {id} answered with state `{}` instead of `upgrading`: {:?}",
                    response.state,
                    response.message
                );
                UpgradeOutcome::Submitted
            }
            Err(e) => {
                log::error!("Unable to upgrade service {id}: {e}");
                UpgradeOutcome::Rejected(RejectReason::Platform(e.to_string()))
            }
        }
    }

    /// Finish an upgrade that reached `upgraded`. `true` only when Rancher
    /// reports `finishing-upgrade`.
    pub async fn finish(&self, service: &SharedService) -> bool {
        let (id, name, url) = {
            let service = service.lock().await;
            (
                service.id.clone(),
                service.name.clone(),
                service.actions.get(Action::FinishUpgrade).cloned(),
            )
        };
        log::info!("Finishing {name} ({id}) upgrade");

        let Some(url) = url else {
            log::warn!("Service {id} offers no finishupgrade action");
            return false;
        };

        match self
            .platform
            .invoke_action(&url, &serde_json::json!({}))
            .await
        {
            Ok(response) if response.state == ServiceState::FinishingUpgrade => {
                log::info!("Successfully upgraded {id}");
                true
            }
            Ok(response) => {
                log::warn!(
                    "Finishing upgrade of {id} answered with state `{}`: {:?}",
                    response.state,
                    response.message
                );
                false
            }
            Err(e) => {
                log::warn!("Unable to finish upgrade of {id}: {e}");
                false
            }
        }
    }
}
