//! 定义了生命周期管理器的可配置参数。
//! Defines configurable parameters for the lifecycle manager.

use std::time::Duration;

/// Namespace used for the device identifiers this crate exports.
/// 本库导出的设备标识符所使用的命名空间。
pub const DEFAULT_IDENTIFIER_DOMAIN: &str = "homekit_controller";

/// A structure containing all configurable parameters for the manager.
///
/// 包含管理器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection-related timeouts.
    /// 连接相关的超时参数。
    pub connection: ConnectionConfig,

    /// Namespace of the identifiers returned by the device-identifier export.
    /// 设备标识符导出所返回标识符的命名空间。
    pub identifier_domain: String,
}

/// Connection-related timeouts.
///
/// 连接相关的超时参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on a single connect handshake. Expiry counts as a transient
    /// setup failure.
    ///
    /// 单次连接握手的上限。超时被视为暂时性的建立失败。
    pub connect_timeout: Duration,
    /// Upper bound on closing a session, both while cleaning up after a failed
    /// setup and while unloading. Expiry is logged and otherwise ignored.
    ///
    /// 关闭会话的上限，适用于失败后的清理和卸载。超时仅记录日志。
    pub close_timeout: Duration,
    /// Upper bound on the unpair request sent during removal.
    /// 移除期间发送的解除配对请求的上限。
    pub unpair_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            identifier_domain: DEFAULT_IDENTIFIER_DOMAIN.to_string(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            unpair_timeout: Duration::from_secs(10),
        }
    }
}
