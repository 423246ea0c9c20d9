use std::sync::Arc;

use super::{RejectReason, SharedService, UpgradeOutcome, Upgrader};
use crate::directory::ServiceDirectory;
use crate::rancher::model::image_uuid;

/// Entry point for push events: upgrade whatever service runs
/// `repository` to `tag` and keep driving it in the background.
pub struct Redeployer {
    directory: Arc<ServiceDirectory>,
    upgrader: Upgrader,
}

impl Redeployer {
    pub fn new(directory: Arc<ServiceDirectory>, upgrader: Upgrader) -> Self {
        Redeployer {
            directory,
            upgrader,
        }
    }

    /// Never fails. Every problem is logged and reported as an outcome.
    ///
    /// Once a service was found and claimed, a convergence loop is spawned
    /// regardless of the outcome so that a rollout already in progress is
    /// still driven to completion. The task is not tracked: when the
    /// process stops it is simply dropped.
    pub async fn redeploy(&self, repository: &str, tag: &str) -> UpgradeOutcome {
        let image = image_uuid(repository, tag);

        let Some(service) = self.lookup(repository).await else {
            log::warn!("No service found for {repository}, ignoring {image}");
            return UpgradeOutcome::Rejected(RejectReason::NotFound);
        };
        let id = service.lock().await.id.clone();

        let Some(guard) = self.upgrader.claim(&id) else {
            log::warn!("Service {id} is already being upgraded, ignoring {image}");
            return UpgradeOutcome::Rejected(RejectReason::Busy);
        };

        self.upgrader.refresh(&service).await;
        let outcome = self.upgrader.upgrade(&service, &image).await;

        let upgrader = self.upgrader.clone();
        tokio::spawn(async move {
            let convergence = upgrader.converge(&service).await;
            log::debug!("Convergence of {} ended: {convergence:?}", guard.id());
            drop(guard);
        });

        outcome
    }

    /// Resolve through the directory, rebuilding it once on a miss.
    async fn lookup(&self, repository: &str) -> Option<SharedService> {
        if let Some(service) = self.directory.resolve(repository) {
            return Some(service);
        }

        if self.directory.is_populated() {
            log::info!("{repository} is not in the service directory, reloading services");
        } else {
            log::info!("Service directory not loaded yet, loading services");
        }
        if let Err(e) = self.directory.rebuild().await {
            log::error!("{e}");
            return None;
        }
        self.directory.resolve(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rancher::fake::{self, FakePlatform};
    use crate::rancher::model::ServiceState;
    use crate::upgrade::convergence::UpgradePolicy;

    fn redeployer(platform: &Arc<FakePlatform>) -> (Redeployer, Arc<ServiceDirectory>) {
        let upgrader = Upgrader::new(platform.clone(), UpgradePolicy::default());
        let directory = Arc::new(ServiceDirectory::new(upgrader.clone()));
        (Redeployer::new(Arc::clone(&directory), upgrader), directory)
    }

    #[tokio::test]
    async fn test_redeploy_upgrades_matching_service() {
        let platform = Arc::new(FakePlatform::with_listing(vec![fake::service(
            "1s7",
            "docker:repo/app:v1",
            ServiceState::Active,
        )]));
        platform.script_reads([Some(ServiceState::Active)]);
        let (redeployer, directory) = redeployer(&platform);

        let outcome = redeployer.redeploy("repo/app", "v2").await;

        assert_eq!(outcome, UpgradeOutcome::Submitted);
        assert_eq!(platform.upgrades(), 1);
        assert_eq!(platform.finishes(), 0);
        // the cache hint never moves the directory key
        assert!(directory.resolve("repo/app").is_some());
    }

    #[tokio::test]
    async fn test_unknown_image_is_not_found_after_one_rebuild() {
        let platform = Arc::new(FakePlatform::with_listing(vec![]));
        let (redeployer, _) = redeployer(&platform);

        let outcome = redeployer.redeploy("repo/unknown", "v2").await;

        assert_eq!(outcome, UpgradeOutcome::Rejected(RejectReason::NotFound));
        assert_eq!(platform.calls(), vec![fake::Call::List]);
    }

    #[tokio::test]
    async fn test_failed_rebuild_is_not_found() {
        let platform = Arc::new(FakePlatform::new());
        let (redeployer, directory) = redeployer(&platform);

        let outcome = redeployer.redeploy("repo/app", "v2").await;

        assert_eq!(outcome, UpgradeOutcome::Rejected(RejectReason::NotFound));
        assert!(!directory.is_populated());
    }

    #[tokio::test]
    async fn test_overlapping_events_are_refused() {
        let platform = Arc::new(FakePlatform::with_listing(vec![fake::service(
            "1s7",
            "docker:repo/app:v1",
            ServiceState::Active,
        )]));
        platform.script_reads([Some(ServiceState::Active)]);
        let (redeployer, _) = redeployer(&platform);

        assert_eq!(
            redeployer.redeploy("repo/app", "v2").await,
            UpgradeOutcome::Submitted
        );
        // the first convergence loop is still waiting for Rancher to settle
        assert_eq!(
            redeployer.redeploy("repo/app", "v3").await,
            UpgradeOutcome::Rejected(RejectReason::Busy)
        );
        assert_eq!(platform.upgrades(), 1);
    }

    #[tokio::test]
    async fn test_stuck_upgrade_is_finished_before_claiming() {
        let platform = Arc::new(FakePlatform::with_listing(vec![fake::service(
            "1s7",
            "docker:repo/app:v1",
            ServiceState::Upgraded,
        )]));
        platform.script_reads([Some(ServiceState::FinishingUpgrade)]);
        let (redeployer, _) = redeployer(&platform);

        let outcome = redeployer.redeploy("repo/app", "v2").await;

        // the rebuild's sweep has released the service by the time it is claimed
        assert_eq!(
            outcome,
            UpgradeOutcome::Rejected(RejectReason::NotActive(ServiceState::FinishingUpgrade))
        );
        assert_eq!(
            platform.calls(),
            vec![
                fake::Call::List,
                fake::Call::FinishUpgrade("1s7".to_string()),
                fake::Call::Get("1s7".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_before_deciding() {
        let platform = Arc::new(FakePlatform::with_listing(vec![fake::service(
            "1s7",
            "docker:repo/app:v1",
            ServiceState::Active,
        )]));
        // listed as active, but Rancher already moved on
        platform.script_reads([Some(ServiceState::Upgrading)]);
        let (redeployer, _) = redeployer(&platform);

        let outcome = redeployer.redeploy("repo/app", "v2").await;

        assert_eq!(
            outcome,
            UpgradeOutcome::Rejected(RejectReason::NotActive(ServiceState::Upgrading))
        );
        assert_eq!(platform.upgrades(), 0);
    }
}
