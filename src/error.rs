//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::registry::DeviceId;
use thiserror::Error;

/// A failure raised by a pairing client.
///
/// This is a closed set: every lifecycle decision (retry, tolerate, propagate)
/// is an exhaustive `match` over these kinds, so a new kind has to be placed
/// explicitly.
///
/// 配对客户端抛出的故障。
///
/// 这是一个封闭集合：每个生命周期决策（重试、容忍、传播）都是对这些种类的穷尽匹配。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// The operation did not complete in time.
    /// 操作未能及时完成。
    #[error("Operation timed out")]
    Timeout,

    /// The accessory could not be found on the local network.
    /// 在本地网络上找不到该配件。
    #[error("Accessory not found on the network")]
    AccessoryNotFound,

    /// The accessory dropped the connection, or is not reachable at all.
    /// 配件断开了连接，或者完全不可达。
    #[error("Accessory disconnected")]
    AccessoryDisconnected,

    /// The encrypted session could not be negotiated.
    /// 无法协商加密会话。
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The accessory rejected our pairing credentials.
    /// 配件拒绝了我们的配对凭据。
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The accessory is busy pairing with another controller.
    /// 配件正忙于与另一个控制器配对。
    #[error("Accessory is busy")]
    Busy,

    /// The accessory no longer holds a pairing for us.
    /// 配件不再持有我们的配对。
    #[error("Accessory is not paired")]
    Unpaired,

    /// The accessory answered with something we could not interpret.
    /// 配件的应答无法解析。
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Anything the client could not classify.
    /// 客户端无法分类的其他错误。
    #[error("Unknown pairing error: {0}")]
    Unknown(String),
}

impl PairingError {
    /// Whether a setup attempt failing with this kind should be retried later.
    ///
    /// 以此类错误失败的建立尝试是否应稍后重试。
    pub fn is_transient(&self) -> bool {
        match self {
            PairingError::Timeout
            | PairingError::AccessoryNotFound
            | PairingError::AccessoryDisconnected
            | PairingError::Encryption(_) => true,
            PairingError::Authentication(_)
            | PairingError::Busy
            | PairingError::Unpaired
            | PairingError::Protocol(_)
            | PairingError::Unknown(_) => false,
        }
    }
}

/// A provisioning payload that failed validation.
///
/// None of the variants carry the offending value, so the network key can
/// never leak through an error message.
///
/// 未通过校验的配网请求。变体中不携带出错的值，因此网络密钥不会通过错误信息泄露。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field `{0}` is missing")]
    Missing(&'static str),

    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` must be between {min} and {max} characters long, got {len}")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
        len: usize,
    },

    #[error("field `{field}` must be in range {min}..={max}, got {value}")]
    Range {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
}

/// The primary error type for the lifecycle manager.
/// 生命周期管理器的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// A handle for this identity is already registered.
    /// 该身份的句柄已经注册。
    #[error("Device {0} is already registered")]
    DuplicateIdentity(DeviceId),

    /// No handle is registered for this identity.
    /// 该身份没有已注册的句柄。
    #[error("Device {0} is not registered")]
    NotFound(DeviceId),

    /// Setup hit a transient failure; the caller should retry later.
    ///
    /// 建立过程遇到暂时性故障；调用方应稍后重试。
    #[error("Device {identity} is not ready yet: {source}")]
    NotReady {
        identity: DeviceId,
        #[source]
        source: PairingError,
    },

    /// Setup failed with a kind that retrying will not fix.
    /// 建立过程以重试无法修复的错误失败。
    #[error("Setup of device {identity} failed: {source}")]
    Setup {
        identity: DeviceId,
        #[source]
        source: PairingError,
    },

    /// The accessory could not be unpaired during removal.
    /// 移除期间无法解除配件配对。
    #[error("Unpairing device {identity} failed: {source}")]
    Unpair {
        identity: DeviceId,
        #[source]
        source: PairingError,
    },

    /// A pairing client operation failed and is passed through unchanged.
    /// 配对客户端操作失败，原样传递。
    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// An administrative payload was malformed.
    /// 管理命令的载荷格式错误。
    #[error("Invalid provisioning request: {0}")]
    Validation(#[from] ValidationError),

    /// A configuration record could not be interpreted.
    /// 无法解析配置记录。
    #[error("Invalid pairing record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is the "not ready yet" signal from setup.
    ///
    /// 是否为建立过程发出的“尚未就绪”信号。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotReady { .. })
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
