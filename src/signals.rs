use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::sync::Arc;

use crate::directory::ServiceDirectory;

/// Stop right away. Convergence loops still running are abandoned; any
/// service they leave in `upgraded` is finished by the next directory
/// rebuild.
pub fn handle_shutdown() {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).expect("No signals :(. This really should never happen");

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::warn!("Received signal {signal}, shutting down");
            std::process::exit(0);
        }
    });
}

/// Rebuild the service directory on SIGHUP.
pub fn handle_reload(directory: Arc<ServiceDirectory>, rt_handle: tokio::runtime::Handle) {
    let mut signals = Signals::new([SIGHUP]).expect("No signals :(");

    std::thread::spawn(move || {
        for _ in signals.forever() {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Reloading]);
            log::info!("Received SIGHUP, reloading services");

            if let Err(e) = rt_handle.block_on(directory.rebuild()) {
                log::error!("{e}");
            }

            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
        }
    });
}
