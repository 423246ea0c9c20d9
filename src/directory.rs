use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::rancher::RancherError;
use crate::rancher::model::{ServiceKind, ServiceState, image_key};
use crate::upgrade::{SharedService, Upgrader};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Unable to load services from Rancher: {0}")]
    Listing(#[from] RancherError),
}

#[derive(Debug, Default)]
struct Catalog {
    /// Plain services keyed by image without scheme or tag.
    services: HashMap<String, SharedService>,
    /// Load balancers keyed by FQDN.
    load_balancers: HashMap<String, SharedService>,
}

/// In-memory view of the project's services, rebuilt from a full listing.
///
/// Readers get a consistent catalog: a rebuild assembles a new one and
/// swaps it in whole. The lock is never held across an `.await`.
pub struct ServiceDirectory {
    upgrader: Upgrader,
    catalog: RwLock<Option<Arc<Catalog>>>,
}

impl ServiceDirectory {
    pub fn new(upgrader: Upgrader) -> Self {
        ServiceDirectory {
            upgrader,
            catalog: RwLock::new(None),
        }
    }

    fn current(&self) -> Option<Arc<Catalog>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, catalog: Option<Catalog>) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog.map(Arc::new);
    }

    pub fn is_populated(&self) -> bool {
        self.current().is_some()
    }

    /// Service running `image`. Accepts a bare repository (`repo/app`) as
    /// well as a full reference (`docker:repo/app:v1`).
    pub fn resolve(&self, image: &str) -> Option<SharedService> {
        self.current()?.services.get(image_key(image)).cloned()
    }

    pub fn load_balancer(&self, fqdn: &str) -> Option<SharedService> {
        self.current()?.load_balancers.get(fqdn).cloned()
    }

    /// Reload every service of the project.
    ///
    /// On failure the directory is left empty until the next successful
    /// rebuild. Services found stuck in `upgraded` get their upgrade
    /// finished, unless an upgrade of theirs is already in flight.
    /// Returns the number of plain services indexed.
    ///
    /// The finish calls run before returning, one per stuck service, so a
    /// caller that claims a service right after a rebuild never races the
    /// sweep for it. A webhook that triggered the rebuild waits for them.
    pub async fn rebuild(&self) -> Result<usize, DirectoryError> {
        let listing = match self.upgrader.platform().list_services().await {
            Ok(listing) => listing,
            Err(e) => {
                self.replace(None);
                return Err(e.into());
            }
        };

        let mut catalog = Catalog::default();
        let mut stuck = Vec::new();

        for service in listing {
            match service.kind.clone() {
                ServiceKind::Service => {
                    let Some(key) = service.image_key().map(str::to_string) else {
                        log::debug!("Service {} has no image, skipping", service.id);
                        continue;
                    };
                    let upgraded = service.state == ServiceState::Upgraded;
                    let shared = Arc::new(Mutex::new(service));
                    if upgraded {
                        stuck.push(Arc::clone(&shared));
                    }
                    catalog.services.insert(key, shared);
                }
                ServiceKind::LoadBalancer => match service.fqdn.clone() {
                    Some(fqdn) => {
                        catalog
                            .load_balancers
                            .insert(fqdn, Arc::new(Mutex::new(service)));
                    }
                    None => log::debug!("Load balancer {} has no FQDN, skipping", service.id),
                },
                ServiceKind::Other(kind) => {
                    log::debug!("Ignoring {} of type `{kind}`", service.id)
                }
            }
        }

        let count = catalog.services.len();
        log::info!("Loaded {count} services");
        log::info!("Loaded {} load balancers", catalog.load_balancers.len());
        self.replace(Some(catalog));

        for service in stuck {
            let id = service.lock().await.id.clone();
            let Some(_guard) = self.upgrader.claim(&id) else {
                log::info!("Service {id} is upgraded but already being handled");
                continue;
            };
            log::info!("Service {id} found in upgraded state, finishing upgrade");
            self.upgrader.finish(&service).await;
        }

        Ok(count)
    }
}
