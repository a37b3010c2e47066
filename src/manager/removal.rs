//! Removal of a device's configuration, with best-effort unpairing.
//! 移除设备配置，并尽力解除配对。

use super::LifecycleManager;
use crate::connection::close_best_effort;
use crate::error::{Error, PairingError, Result};
use crate::pairing::ConfigEntry;
use tokio::time;
use tracing::{info, warn};

impl LifecycleManager {
    /// Unpairs the accessory behind a config entry that is being deleted.
    ///
    /// A connection still registered for the accessory is unloaded first.
    /// The unpair itself always works from a fresh client loaded from the
    /// persisted record, since a registered session may already be torn
    /// down. An unreachable
    /// accessory only produces a warning, since the local removal has to go
    /// ahead either way. Every other failure is returned as `Error::Unpair`.
    ///
    /// 为正在删除的配置条目对应的配件解除配对。
    ///
    /// 若该配件仍有已注册的连接，先将其卸载。
    /// 解除配对始终使用从持久化记录加载的新客户端，因为已注册的会话可能已经被拆除。
    /// 配件不可达只会产生一条警告，因为本地移除无论如何都必须继续。其他所有故障以 `Error::Unpair` 返回。
    pub async fn remove(&self, entry: &ConfigEntry) -> Result<()> {
        let identity = entry.data.identity();
        if let Some(handle) = self.inner.registry.get(&identity) {
            handle
                .unload(&self.inner.registry, &self.inner.triggers)
                .await;
        }

        let client = self.inner.controller.load_pairing(&entry.data)?;

        let outcome = match time::timeout(
            self.inner.config.connection.unpair_timeout,
            client.unpair(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PairingError::Timeout),
        };

        let result = match outcome {
            Ok(()) => {
                info!(identity = %identity, title = %entry.title, "Accessory unpaired");
                Ok(())
            }
            Err(PairingError::AccessoryDisconnected) => {
                warn!(
                    identity = %identity,
                    "Accessory {} was removed but was not reachable to properly unpair. \
                     It may need resetting before it can be paired again",
                    entry.title
                );
                Ok(())
            }
            Err(source) => Err(Error::Unpair { identity: identity.clone(), source }),
        };

        close_best_effort(
            client.as_ref(),
            &identity,
            self.inner.config.connection.close_timeout,
        )
        .await;
        result
    }
}
