use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

/// Scheme Rancher prepends to every image reference in a launch config.
pub const IMAGE_SCHEME: &str = "docker:";

/// Lifecycle state reported by Rancher for a service.
///
/// Only the states the upgrade flow reacts to get their own variant,
/// everything else is carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceState {
    Active,
    Upgrading,
    Upgraded,
    FinishingUpgrade,
    Other(String),
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState::Other(String::new())
    }
}

impl ServiceState {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceState::Active => "active",
            ServiceState::Upgrading => "upgrading",
            ServiceState::Upgraded => "upgraded",
            ServiceState::FinishingUpgrade => "finishing-upgrade",
            ServiceState::Other(state) => state,
        }
    }
}

impl From<String> for ServiceState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => ServiceState::Active,
            "upgrading" => ServiceState::Upgrading,
            "upgraded" => ServiceState::Upgraded,
            "finishing-upgrade" => ServiceState::FinishingUpgrade,
            _ => ServiceState::Other(value),
        }
    }
}

impl From<ServiceState> for String {
    fn from(value: ServiceState) -> Self {
        match value {
            ServiceState::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record type as listed by Rancher. Anything that is neither a plain
/// service nor a load balancer is ignored by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceKind {
    Service,
    LoadBalancer,
    Other(String),
}

impl Default for ServiceKind {
    fn default() -> Self {
        ServiceKind::Other(String::new())
    }
}

impl From<String> for ServiceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "service" => ServiceKind::Service,
            "loadBalancerService" => ServiceKind::LoadBalancer,
            _ => ServiceKind::Other(value),
        }
    }
}

impl From<ServiceKind> for String {
    fn from(value: ServiceKind) -> Self {
        match value {
            ServiceKind::Service => "service".to_string(),
            ServiceKind::LoadBalancer => "loadBalancerService".to_string(),
            ServiceKind::Other(kind) => kind,
        }
    }
}

/// Actions the upgrade flow knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upgrade,
    FinishUpgrade,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Upgrade => "upgrade",
            Action::FinishUpgrade => "finishupgrade",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Action links currently legal for a service.
///
/// Rancher only includes an action when the current state allows it, so a
/// `None` here means the action cannot be performed right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<Url>,
    #[serde(
        default,
        rename = "finishupgrade",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_upgrade: Option<Url>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

impl Actions {
    pub fn get(&self, action: Action) -> Option<&Url> {
        match action {
            Action::Upgrade => self.upgrade.as_ref(),
            Action::FinishUpgrade => self.finish_upgrade.as_ref(),
        }
    }
}

/// Container launch configuration of a service.
///
/// Fields the upgrade flow does not touch are kept in `extra` so the
/// configuration is sent back to Rancher unmodified apart from the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(rename = "imageUuid")]
    pub image_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LaunchConfig {
    /// Copy of this configuration pointing at another image.
    pub fn with_image(&self, image_uuid: &str) -> Self {
        LaunchConfig {
            image_uuid: image_uuid.to_string(),
            ..self.clone()
        }
    }
}

/// The part of a service that changes while it is being upgraded.
/// Always read and written as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub actions: Actions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: ServiceKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: ServiceState,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub launch_config: Option<LaunchConfig>,
    #[serde(default)]
    pub actions: Actions,
}

impl Service {
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            state: self.state.clone(),
            actions: self.actions.clone(),
        }
    }

    pub fn apply(&mut self, status: ServiceStatus) {
        self.state = status.state;
        self.actions = status.actions;
    }

    /// Key under which the directory indexes this service.
    pub fn image_key(&self) -> Option<&str> {
        self.launch_config
            .as_ref()
            .map(|config| image_key(&config.image_uuid))
            .filter(|key| !key.is_empty())
    }
}

/// Response of the services listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceCollection {
    #[serde(default)]
    pub data: Vec<Service>,
}

/// Body of an `upgrade` action using the in-service (rolling) strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    pub in_service_strategy: InServiceStrategy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InServiceStrategy {
    pub launch_config: LaunchConfig,
}

impl UpgradeRequest {
    pub fn in_service(launch_config: LaunchConfig) -> Self {
        UpgradeRequest {
            in_service_strategy: InServiceStrategy { launch_config },
        }
    }
}

/// What Rancher answers to an action POST.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub state: ServiceState,
    #[serde(default)]
    pub actions: Actions,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Image reference as stored in a launch config, e.g. `docker:repo/app:v2`.
pub fn image_uuid(repository: &str, tag: &str) -> String {
    format!("{IMAGE_SCHEME}{repository}:{tag}")
}

/// Strip the scheme and the tag (or digest) off an image reference.
///
/// `docker:localhost:5000/app:v1` becomes `localhost:5000/app`.
pub fn image_key(reference: &str) -> &str {
    let image = reference.strip_prefix(IMAGE_SCHEME).unwrap_or(reference);

    if let Some(at_pos) = image.find('@') {
        return &image[..at_pos];
    }

    // A colon followed by a slash belongs to a registry port, not a tag
    match image.rfind(':') {
        Some(colon_pos) if !image[colon_pos + 1..].contains('/') => &image[..colon_pos],
        _ => image,
    }
}
