#![deny(clippy::expect_used, clippy::unwrap_used)]

//! Lifecycle management for connections to paired network accessories.
//! 已配对网络配件连接的生命周期管理。

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod pairing;
pub mod provision;
pub mod registry;
pub mod triggers;

mod testing;

pub use config::Config;
pub use connection::{ConnectionHandle, SetupStatus};
pub use error::{Error, PairingError, Result, ValidationError};
pub use manager::{DeviceIdentifier, LifecycleManager};
pub use pairing::{ConfigEntry, PairingClient, PairingController, PairingRecord};
pub use provision::{ProvisioningDispatcher, ThreadCredentials, ThreadProvisionRequest};
pub use registry::{ConnectionRegistry, DeviceId};
pub use triggers::{TriggerInfo, TriggerRegistry};
