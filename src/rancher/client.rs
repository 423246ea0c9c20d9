use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::model::{ActionResponse, Service, ServiceCollection};
use super::{Platform, RancherError, Result};
use crate::config::RancherConfig;

const API_VERSION: &str = "v2-beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const JSON: &str = "application/json";

/// HTTP client for a single Rancher project, authenticated with an API
/// key pair.
#[derive(Debug, Clone)]
pub struct RancherClient {
    http: Client,
    services_url: String,
    api_key: String,
    api_secret: String,
}

impl RancherClient {
    pub fn new(config: &RancherConfig) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let services_url = format!(
            "{}/{API_VERSION}/projects/{}/services",
            config.host.as_str().trim_end_matches('/'),
            config.project_id
        );
        // Fail at start-up rather than on the first webhook
        Url::parse(&services_url)?;

        Ok(RancherClient {
            http,
            services_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .header(ACCEPT, JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RancherError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(JSON) {
            return Err(RancherError::ContentType(content_type));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Platform for RancherClient {
    async fn list_services(&self) -> Result<Vec<Service>> {
        let collection: ServiceCollection = self.send(self.http.get(&self.services_url)).await?;
        Ok(collection.data)
    }

    async fn get_service(&self, id: &str) -> Result<Service> {
        let url = format!("{}/{id}", self.services_url);
        self.send(self.http.get(url)).await
    }

    async fn invoke_action(&self, url: &Url, body: &serde_json::Value) -> Result<ActionResponse> {
        self.send(self.http.post(url.clone()).json(body)).await
    }
}
