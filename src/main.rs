use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use rancher_redeploy::{
    cli,
    config::RedeployConfig,
    directory::ServiceDirectory,
    rancher::{Platform, client::RancherClient},
    signals,
    upgrade::{Upgrader, redeploy::Redeployer},
    webhook::{self, WebhookState},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Variables from a .env file, if there is one
    let _ = dotenv::dotenv();

    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();

    let config = match RedeployConfig::try_init() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Unable to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let platform: Arc<dyn Platform> = match RancherClient::new(&config.rancher) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Unable to create Rancher client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let upgrader = Upgrader::new(platform, config.policy);
    let directory = Arc::new(ServiceDirectory::new(upgrader.clone()));

    // Give Rancher a moment when both are started together
    tokio::spawn({
        let directory = Arc::clone(&directory);
        let delay = config.bootstrap_delay;
        async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = directory.rebuild().await {
                log::error!("{e}");
            }
        }
    });

    signals::handle_reload(Arc::clone(&directory), tokio::runtime::Handle::current());
    signals::handle_shutdown();

    let state = Arc::new(WebhookState {
        redeployer: Arc::new(Redeployer::new(directory, upgrader)),
        key: config.webhook_key,
        http: reqwest::Client::new(),
    });

    let addr = SocketAddr::new(args.address, args.port);
    if let Err(e) = webhook::serve(addr, state).await {
        log::error!("Webhook listener on {addr} failed: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
