//! The boundary to the pairing protocol: the client that owns one encrypted
//! session, the controller that builds clients, and the persisted record
//! clients are built from.
//!
//! 配对协议的边界：持有单个加密会话的客户端、构建客户端的控制器，以及用于构建客户端的持久化记录。
pub mod client;
pub mod record;

pub use client::{PairingClient, PairingController};
pub use record::{ConfigEntry, PairingRecord};
