//! Rolling upgrades of Rancher services driven by Docker Hub push webhooks.
//!
//! A push names an image and tag. The [`directory`] finds the service
//! running that image, [`upgrade`] submits an in-service upgrade and a
//! background loop polls Rancher until the upgrade can be finished.

pub mod cli;
pub mod config;
pub mod directory;
pub mod rancher;
pub mod signals;
pub mod upgrade;
pub mod webhook;
