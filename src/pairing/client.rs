//! Traits for abstracting over the pairing protocol implementation.
use crate::error::PairingError;
use crate::pairing::record::PairingRecord;
use crate::provision::ThreadCredentials;
use async_trait::async_trait;
use std::sync::Arc;

/// A client holding the session with one paired accessory.
///
/// The lifecycle manager never speaks the protocol itself; it only drives
/// these operations and classifies the `PairingError` they return. Any
/// intrinsic timeout the client enforces should surface as
/// `PairingError::Timeout`.
///
/// 持有与单个已配对配件会话的客户端。
///
/// 生命周期管理器从不直接使用协议，它只驱动这些操作并对返回的 `PairingError` 进行分类。
#[async_trait]
pub trait PairingClient: Send + Sync + 'static {
    /// Performs the pairing/session handshake with the accessory.
    /// 与配件进行配对/会话握手。
    async fn connect(&self) -> Result<(), PairingError>;

    /// Closes the session and releases its resources.
    /// 关闭会话并释放其资源。
    async fn close(&self) -> Result<(), PairingError>;

    /// Removes our pairing from the accessory, making it discoverable again.
    /// 从配件上移除我们的配对，使其重新可被发现。
    async fn unpair(&self) -> Result<(), PairingError>;

    /// Hands Thread network credentials to the accessory.
    /// 将 Thread 网络凭据下发给配件。
    async fn thread_provision(&self, credentials: &ThreadCredentials) -> Result<(), PairingError>;

    /// The accessory ids (`aid`) this pairing exposes. Empty until the
    /// accessory database has been read.
    ///
    /// 该配对暴露的配件 id（`aid`）。在读取配件数据库之前为空。
    fn accessory_ids(&self) -> Vec<u64>;
}

/// Builds pairing clients from persisted records.
///
/// 根据持久化记录构建配对客户端。
pub trait PairingController: Send + Sync + 'static {
    /// Loads a client for the pairing described by `record`.
    ///
    /// Each call returns a new, independent client; nothing is shared with
    /// clients loaded earlier for the same pairing.
    ///
    /// 为 `record` 描述的配对加载一个客户端。每次调用都返回一个新的独立客户端。
    fn load_pairing(
        &self,
        record: &PairingRecord,
    ) -> Result<Arc<dyn PairingClient>, PairingError>;
}
