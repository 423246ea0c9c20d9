use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::upgrade::UpgradeOutcome;

/// Body Docker Hub expects on a webhook callback URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackBody {
    pub state: &'static str,
    pub description: String,
    pub context: &'static str,
}

impl CallbackBody {
    pub fn for_outcome(image: &str, outcome: &UpgradeOutcome) -> Self {
        let (state, description) = match outcome {
            UpgradeOutcome::Submitted => ("success", format!("Upgrade to {image} submitted")),
            UpgradeOutcome::Finalized => ("success", format!("Pending upgrade finished for {image}")),
            UpgradeOutcome::Rejected(reason) => ("failure", format!("{image} not deployed: {reason}")),
        };
        CallbackBody {
            state,
            description,
            context: "rancher-redeploy",
        }
    }
}

/// Report back to Docker Hub without waiting for the answer.
pub fn notify(http: Client, url: Url, body: CallbackBody) {
    tokio::spawn(async move {
        if let Err(e) = send(&http, &url, &body).await {
            log::warn!("Callback to {url} failed: {e}");
        }
    });
}

async fn send(http: &Client, url: &Url, body: &CallbackBody) -> Result<(), reqwest::Error> {
    http.post(url.clone())
        .json(body)
        .send()
        .await?
        .error_for_status()?;
    log::debug!("Callback to {url} delivered");
    Ok(())
}
