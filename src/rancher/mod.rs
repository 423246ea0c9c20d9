//! Access to the Rancher `v2-beta` API.
//!
//! The upgrade flow only talks to Rancher through the [`Platform`] trait so
//! that the orchestration logic can run against an in-memory platform in
//! tests. [`client::RancherClient`] is the HTTP implementation.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub mod client;
#[cfg(test)]
pub mod fake;
pub mod model;

use model::{ActionResponse, Service};

pub type Result<T> = std::result::Result<T, RancherError>;

#[derive(Error, Debug)]
pub enum RancherError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Rancher responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Expected a JSON response, got content type '{0}'")]
    ContentType(String),
    #[error("JSON deserialization error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Every service of the configured project.
    async fn list_services(&self) -> Result<Vec<Service>>;

    /// Current snapshot of a single service.
    async fn get_service(&self, id: &str) -> Result<Service>;

    /// POST `body` to an action link taken from a service's `actions`.
    async fn invoke_action(&self, url: &Url, body: &serde_json::Value) -> Result<ActionResponse>;
}
