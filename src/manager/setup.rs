//! Connection setup and failure classification.
//! 连接建立与故障分类。

use super::LifecycleManager;
use crate::connection::{ConnectionHandle, SetupStatus};
use crate::error::{Error, PairingError, Result};
use crate::pairing::ConfigEntry;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, info};

impl LifecycleManager {
    /// Sets up the connection described by `entry`.
    ///
    /// The handle is registered before the handshake starts. A transient
    /// failure evicts it again, closes whatever part of the session was
    /// opened and returns `Error::NotReady`; the caller owns the retry
    /// schedule. Any other failure evicts the handle and returns
    /// `Error::Setup`.
    ///
    /// If the handle is unloaded while the handshake is still running (for
    /// example by a process-wide shutdown), `Ok(())` is returned but the
    /// connection is not established: the handle stays `Unloaded`, is no
    /// longer registered and the freshly opened session is closed. Check
    /// `registry().contains(..)` before treating the device as up.
    ///
    /// Entries created before unique ids were recorded get one backfilled;
    /// the caller should persist `entry` when that happens.
    ///
    /// 建立 `entry` 描述的连接。
    ///
    /// 句柄在握手开始前注册。暂时性故障会将其移除、关闭已部分打开的会话并返回 `Error::NotReady`，
    /// 重试计划由调用方负责。其他任何故障都会移除句柄并返回 `Error::Setup`。
    ///
    /// 若握手期间句柄被卸载（例如进程级关闭），返回 `Ok(())`，但连接并未建立：
    /// 句柄保持 `Unloaded`、不再注册，新打开的会话也会被关闭。
    pub async fn setup(&self, entry: &mut ConfigEntry) -> Result<()> {
        let identity = entry.data.identity();
        if entry.backfill_unique_id() {
            debug!(
                identity = %identity,
                entry_id = %entry.entry_id,
                "Backfilled unique id for config entry"
            );
        }

        let client = self.inner.controller.load_pairing(&entry.data)?;
        let handle = Arc::new(ConnectionHandle::new(
            identity.clone(),
            client,
            self.inner.config.connection.close_timeout,
        ));
        self.inner.registry.register(handle.clone())?;

        let outcome = match time::timeout(
            self.inner.config.connection.connect_timeout,
            handle.connect(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PairingError::Timeout),
        };

        match outcome {
            Ok(()) => {
                if handle.finish_setup(SetupStatus::Established) {
                    info!(identity = %identity, "Connection established");
                } else {
                    // Unloaded mid-handshake; close the session it just opened.
                    debug!(identity = %identity, "Connection unloaded during setup");
                    handle.close_quietly().await;
                }
                Ok(())
            }
            Err(source) => {
                self.inner.registry.remove_handle(&handle);
                handle.finish_setup(SetupStatus::Failed);
                handle.close_quietly().await;

                if source.is_transient() {
                    info!(
                        identity = %identity,
                        error = %source,
                        "Accessory not ready, setup will be retried"
                    );
                    Err(Error::NotReady { identity, source })
                } else {
                    Err(Error::Setup { identity, source })
                }
            }
        }
    }
}
