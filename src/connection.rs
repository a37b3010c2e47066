//! 定义了单个配件连接的句柄。
//! Defines the handle for a single accessory connection.

use crate::error::PairingError;
use crate::pairing::PairingClient;
use crate::registry::{ConnectionRegistry, DeviceId};
use crate::triggers::TriggerRegistry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

/// Where a connection stands in its lifecycle.
///
/// 连接在其生命周期中所处的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SetupStatus {
    /// Registered, handshake not finished yet.
    /// 已注册，握手尚未完成。
    Pending = 0,
    /// Handshake succeeded.
    /// 握手成功。
    Established = 1,
    /// Handshake failed; the handle has been evicted.
    /// 握手失败；句柄已被移出注册表。
    Failed = 2,
    /// Torn down by an unload or shutdown.
    /// 已被卸载或关闭流程拆除。
    Unloaded = 3,
}

impl SetupStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SetupStatus::Pending,
            1 => SetupStatus::Established,
            2 => SetupStatus::Failed,
            _ => SetupStatus::Unloaded,
        }
    }
}

/// Binds a device identity to the pairing client that talks to it.
///
/// The client is owned by the handle for as long as the handle is
/// registered. Status changes go through compare-and-swap so a handle that
/// was unloaded while its handshake was still in flight stays unloaded.
///
/// 将设备身份与同其通信的配对客户端绑定。
///
/// 只要句柄处于注册状态，客户端就归句柄所有。状态变更通过 CAS 完成，
/// 因此握手期间被卸载的句柄会保持卸载状态。
pub struct ConnectionHandle {
    identity: DeviceId,
    client: Arc<dyn PairingClient>,
    status: AtomicU8,
    close_timeout: Duration,
}

impl ConnectionHandle {
    pub fn new(
        identity: DeviceId,
        client: Arc<dyn PairingClient>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            client,
            status: AtomicU8::new(SetupStatus::Pending as u8),
            close_timeout,
        }
    }

    pub fn identity(&self) -> &DeviceId {
        &self.identity
    }

    /// The underlying pairing client.
    /// 底层配对客户端。
    pub fn client(&self) -> &Arc<dyn PairingClient> {
        &self.client
    }

    pub fn status(&self) -> SetupStatus {
        SetupStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Runs the pairing/session handshake.
    /// 执行配对/会话握手。
    pub(crate) async fn connect(&self) -> Result<(), PairingError> {
        self.client.connect().await
    }

    /// Moves `Pending` to `next`. Returns `false` if the handle already left
    /// `Pending`, e.g. because it was unloaded mid-handshake.
    ///
    /// 将状态从 `Pending` 切换到 `next`。若句柄已离开 `Pending`（例如握手期间被卸载），返回 `false`。
    pub(crate) fn finish_setup(&self, next: SetupStatus) -> bool {
        self.status
            .compare_exchange(
                SetupStatus::Pending as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Closes the session without letting a failure escape.
    /// 关闭会话，且不让任何失败向外传播。
    pub(crate) async fn close_quietly(&self) -> bool {
        close_best_effort(self.client.as_ref(), &self.identity, self.close_timeout).await
    }

    /// Gracefully unloads this connection.
    ///
    /// Removes the handle's own registry entry and its triggers, then closes
    /// the session. Calling it again is a no-op. A failing close is logged
    /// and otherwise ignored.
    ///
    /// 优雅地卸载此连接。
    ///
    /// 移除句柄自身的注册表条目及其触发器，然后关闭会话。重复调用不产生任何效果。
    /// 关闭失败只会被记录日志。
    pub async fn unload(&self, registry: &ConnectionRegistry, triggers: &TriggerRegistry) {
        let previous = self
            .status
            .swap(SetupStatus::Unloaded as u8, Ordering::AcqRel);
        if SetupStatus::from_u8(previous) == SetupStatus::Unloaded {
            debug!(identity = %self.identity, "Connection already unloaded");
            return;
        }

        registry.remove_handle(self);
        let dropped = triggers.remove_device(&self.identity);
        if dropped > 0 {
            debug!(identity = %self.identity, dropped, "Dropped device triggers");
        }

        if !self.close_quietly().await {
            warn!(identity = %self.identity, "Session did not close cleanly during unload");
        }
        info!(identity = %self.identity, "Connection unloaded");
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("identity", &self.identity)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Closes `client`, bounded by `limit`. Neither a close error nor the bound
/// expiring is propagated; both count as already cleaned up. Returns whether
/// the close finished cleanly.
///
/// 在 `limit` 限制内关闭 `client`。关闭错误和超时都不会传播，均视为已清理。返回关闭是否顺利完成。
pub(crate) async fn close_best_effort(
    client: &dyn PairingClient,
    identity: &DeviceId,
    limit: Duration,
) -> bool {
    match time::timeout(limit, client.close()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(identity = %identity, error = %e, "Ignoring error while closing session");
            false
        }
        Err(_) => {
            debug!(identity = %identity, "Timed out closing session, treating it as closed");
            false
        }
    }
}
