//! In-memory Rancher used by the unit tests.
//!
//! Records every call and serves scripted states, which keeps the
//! orchestration tests deterministic.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

use super::model::{
    ActionResponse, Actions, LaunchConfig, Service, ServiceKind, ServiceState,
};
use super::{Platform, RancherError, Result};
use crate::upgrade::SharedService;

pub const PROJECT_URL: &str = "http://rancher.test/v2-beta/projects/1a5";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Get(String),
    Upgrade { id: String, body: Value },
    FinishUpgrade(String),
}

#[derive(Default)]
pub struct FakePlatform {
    listing: Mutex<Option<Vec<Service>>>,
    /// States served by `get_service`. `None` entries fail the read.
    reads: Mutex<VecDeque<Option<ServiceState>>>,
    last_read: Mutex<Option<ServiceState>>,
    upgrade_reply: Mutex<Option<ServiceState>>,
    finish_replies: Mutex<VecDeque<ServiceState>>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(services: Vec<Service>) -> Self {
        let platform = Self::default();
        *platform.listing.lock().unwrap() = Some(services);
        platform
    }

    /// Queue states for consecutive reads. Once the queue is drained the
    /// last successfully served state keeps being returned.
    pub fn script_reads(&self, reads: impl IntoIterator<Item = Option<ServiceState>>) {
        self.reads.lock().unwrap().extend(reads);
    }

    pub fn reply_to_upgrade(&self, state: ServiceState) {
        *self.upgrade_reply.lock().unwrap() = Some(state);
    }

    /// Queue replies to `finishupgrade`, `finishing-upgrade` once drained.
    pub fn reply_to_finish(&self, replies: impl IntoIterator<Item = ServiceState>) {
        self.finish_replies.lock().unwrap().extend(replies);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.count(|call| matches!(call, Call::Get(_)))
    }

    pub fn upgrades(&self) -> usize {
        self.count(|call| matches!(call, Call::Upgrade { .. }))
    }

    pub fn finishes(&self) -> usize {
        self.count(|call| matches!(call, Call::FinishUpgrade(_)))
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unavailable() -> RancherError {
    RancherError::Status {
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_services(&self) -> Result<Vec<Service>> {
        self.record(Call::List);
        self.listing.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn get_service(&self, id: &str) -> Result<Service> {
        self.record(Call::Get(id.to_string()));
        let next = self.reads.lock().unwrap().pop_front();
        let state = match next {
            Some(Some(state)) => state,
            Some(None) => return Err(unavailable()),
            None => self.last_read.lock().unwrap().clone().ok_or_else(unavailable)?,
        };
        *self.last_read.lock().unwrap() = Some(state.clone());
        Ok(service(id, "docker:repo/app:v1", state))
    }

    async fn invoke_action(&self, url: &Url, body: &Value) -> Result<ActionResponse> {
        let id = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .unwrap_or_default()
            .to_string();
        let action = url
            .query_pairs()
            .find(|(key, _)| key == "action")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        let state = match action.as_str() {
            "upgrade" => {
                self.record(Call::Upgrade {
                    id: id.clone(),
                    body: body.clone(),
                });
                self.upgrade_reply
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or(ServiceState::Upgrading)
            }
            "finishupgrade" => {
                self.record(Call::FinishUpgrade(id.clone()));
                self.finish_replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(ServiceState::FinishingUpgrade)
            }
            other => panic!("Unexpected action {other}"),
        };

        Ok(ActionResponse {
            id: Some(id.clone()),
            kind: Some("service".to_string()),
            actions: actions_for(&id, &state),
            state,
            ..ActionResponse::default()
        })
    }
}

pub fn action_url(id: &str, action: &str) -> Url {
    Url::parse(&format!("{PROJECT_URL}/services/{id}/?action={action}")).unwrap()
}

/// Action links Rancher exposes in each state.
pub fn actions_for(id: &str, state: &ServiceState) -> Actions {
    match state {
        ServiceState::Active => Actions {
            upgrade: Some(action_url(id, "upgrade")),
            ..Actions::default()
        },
        ServiceState::Upgraded => Actions {
            finish_upgrade: Some(action_url(id, "finishupgrade")),
            ..Actions::default()
        },
        _ => Actions::default(),
    }
}

pub fn service(id: &str, image: &str, state: ServiceState) -> Service {
    Service {
        id: id.to_string(),
        kind: ServiceKind::Service,
        name: format!("svc-{id}"),
        account_id: Some("1a5".to_string()),
        fqdn: None,
        launch_config: Some(LaunchConfig {
            image_uuid: image.to_string(),
            kind: Some("container".to_string()),
            ports: Some(vec!["8080:80/tcp".to_string()]),
            ..LaunchConfig::default()
        }),
        actions: actions_for(id, &state),
        state,
    }
}

pub fn load_balancer(id: &str, fqdn: &str) -> Service {
    Service {
        id: id.to_string(),
        kind: ServiceKind::LoadBalancer,
        name: format!("lb-{id}"),
        state: ServiceState::Active,
        account_id: Some("1a5".to_string()),
        fqdn: Some(fqdn.to_string()),
        launch_config: Some(LaunchConfig {
            image_uuid: "docker:rancher/lb-service-haproxy:v0.7.9".to_string(),
            ..LaunchConfig::default()
        }),
        actions: Actions::default(),
    }
}

pub fn shared(service: Service) -> SharedService {
    Arc::new(AsyncMutex::new(service))
}
