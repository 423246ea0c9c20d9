use serde::Deserialize;
use url::Url;

/// Push notification sent by a Docker Hub repository webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(default)]
    pub callback_url: Option<Url>,
    pub push_data: PushData,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushData {
    pub tag: String,
    #[serde(default)]
    pub pusher: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    pub repo_name: String,
}
