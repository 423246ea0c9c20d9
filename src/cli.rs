use std::{net::IpAddr, path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Redeploy Rancher services when a new image is pushed to Docker Hub.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "rancher-redeploy.toml")]
    pub config: PathBuf,
    /// Address to bind for listening for Docker Hub webhooks.
    #[arg(short, long, default_value = "0.0.0.0")]
    pub address: IpAddr,
    /// Port to bind for listening for Docker Hub webhooks.
    #[arg(short, long, default_value_t = 8091)]
    pub port: u16,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["rancher-redeploy"]);
        assert_eq!(args.config, PathBuf::from("rancher-redeploy.toml"));
        assert_eq!(args.address.to_string(), "0.0.0.0");
        assert_eq!(args.port, 8091);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "rancher-redeploy",
            "--config",
            "/etc/redeploy.toml",
            "-a",
            "127.0.0.1",
            "-p",
            "9000",
        ]);
        assert_eq!(args.config, PathBuf::from("/etc/redeploy.toml"));
        assert_eq!(args.address.to_string(), "127.0.0.1");
        assert_eq!(args.port, 9000);
    }
}
