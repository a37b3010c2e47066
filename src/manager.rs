//! 生命周期管理器 - 协调注册表变更、建立、批量关闭和移除
//! Lifecycle Manager - coordinates registry mutation, setup, mass shutdown and removal
//!
//! 管理器持有一个连接注册表和一个触发器注册表，每个进程一个实例。
//! 句柄在握手开始之前就已注册，因此在握手进行期间，配网分派和关闭扇出都能找到该设备。
//!
//! The manager holds one connection registry and one trigger registry, one
//! instance per process. Handles are registered before their handshake
//! starts, so provisioning dispatch and shutdown fan-out can reach a device
//! while its handshake is still in flight.

use crate::config::Config;
use crate::error::Result;
use crate::pairing::PairingController;
use crate::provision::{ProvisioningDispatcher, ThreadProvisionRequest};
use crate::registry::{ConnectionRegistry, DeviceId};
use crate::triggers::TriggerRegistry;
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info};

mod identifiers;
mod removal;
mod setup;

pub use identifiers::DeviceIdentifier;

struct ManagerInner {
    config: Config,
    controller: Arc<dyn PairingController>,
    registry: ConnectionRegistry,
    triggers: TriggerRegistry,
    stop_listener_installed: AtomicBool,
}

/// A handle to the process-wide connection lifecycle manager.
///
/// Cheap to clone; all clones share the same registries.
///
/// 进程级连接生命周期管理器的句柄。克隆开销很小，所有克隆共享相同的注册表。
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<ManagerInner>,
}

impl LifecycleManager {
    /// Creates a manager with fresh, empty registries.
    ///
    /// 创建一个带有全新空注册表的管理器。
    pub fn new(config: Config, controller: Arc<dyn PairingController>) -> Self {
        Self::with_registry(config, controller, ConnectionRegistry::new())
    }

    /// Creates a manager around an existing connection registry.
    /// 基于已有的连接注册表创建管理器。
    pub fn with_registry(
        config: Config,
        controller: Arc<dyn PairingController>,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                controller,
                registry,
                triggers: TriggerRegistry::new(),
                stop_listener_installed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.inner.triggers
    }

    /// Subscribes `shutdown_all` to the process stop signal.
    ///
    /// Only the first call installs a listener; it returns the listener task,
    /// which resolves to the number of connections unloaded. Later calls drop
    /// their signal unpolled and return `None`.
    ///
    /// 将 `shutdown_all` 订阅到进程停止信号。
    ///
    /// 只有第一次调用会安装监听器，并返回监听任务（其结果为被卸载的连接数）。
    /// 之后的调用会直接丢弃其信号并返回 `None`。
    pub fn listen_for_stop<F>(&self, stop: F) -> Option<JoinHandle<usize>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self
            .inner
            .stop_listener_installed
            .swap(true, Ordering::AcqRel)
        {
            debug!("Stop listener already installed, ignoring");
            return None;
        }

        let manager = self.clone();
        Some(tokio::spawn(async move {
            stop.await;
            info!("Process stop received, shutting down all connections");
            manager.shutdown_all().await
        }))
    }

    /// Unloads every registered connection concurrently and waits for all of
    /// them. Returns how many connections were unloaded.
    ///
    /// 并发卸载所有已注册的连接并等待全部完成。返回被卸载的连接数。
    pub async fn shutdown_all(&self) -> usize {
        let handles = self.inner.registry.all();
        let count = handles.len();
        debug!(count, "Fanning out connection unload");

        join_all(
            handles
                .iter()
                .map(|handle| handle.unload(&self.inner.registry, &self.inner.triggers)),
        )
        .await;

        self.inner.triggers.clear();
        info!(count, "All connections shut down");
        count
    }

    /// Unloads the connection for `pairing_id`, if one is registered.
    ///
    /// Returns whether a connection was found. The handle removes its own
    /// registry entry.
    ///
    /// 卸载 `pairing_id` 对应的连接（如果已注册）。返回是否找到了连接。句柄会自行移除其注册表条目。
    pub async fn unload(&self, pairing_id: &str) -> bool {
        let identity = DeviceId::new(pairing_id);
        let Some(handle) = self.inner.registry.get(&identity) else {
            debug!(identity = %identity, "Nothing to unload");
            return false;
        };
        handle
            .unload(&self.inner.registry, &self.inner.triggers)
            .await;
        true
    }

    /// A dispatcher with read-only access to the registry.
    /// 一个只读访问注册表的分派器。
    pub fn provisioner(&self) -> ProvisioningDispatcher<'_> {
        ProvisioningDispatcher::new(&self.inner.registry)
    }

    /// Sends Thread credentials to a registered accessory.
    pub async fn provision(&self, request: &ThreadProvisionRequest) -> Result<()> {
        self.provisioner().dispatch(request).await
    }

    /// Entry point of the `thread_provision` administrative command.
    ///
    /// “thread_provision” 管理命令的入口。
    pub async fn handle_thread_provision(&self, payload: &Value) -> Result<()> {
        self.provisioner().dispatch_payload(payload).await
    }
}

#[cfg(test)]
mod tests;
