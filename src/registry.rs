//! 连接注册表 - 设备身份到连接句柄的进程级映射
//! Connection Registry - process-wide mapping from device identity to connection handle

use crate::connection::ConnectionHandle;
use crate::error::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The normalized key of one paired accessory.
///
/// Pairing ids are compared case-insensitively, so every constructor folds
/// the raw id to trimmed lowercase.
///
/// 单个已配对配件的规范化键。配对 id 不区分大小写比较，因此构造时统一转换为去空白的小写形式。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// 连接注册表
/// Connection registry
///
/// 每个身份最多只有一个句柄。所有操作都只在不挂起的瞬间持有分片锁，
/// 句柄以 `Arc` 形式取出，因此调用方可以在不阻塞其他身份的情况下等待句柄上的 I/O。
///
/// Holds at most one handle per identity. Every operation holds a shard lock
/// only for a non-suspending instant; handles are cloned out as `Arc`s so a
/// caller can await I/O on one handle without blocking other identities.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    handles: DashMap<DeviceId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a handle under its own identity.
    ///
    /// 以句柄自身的身份插入句柄。
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Result<()> {
        match self.handles.entry(handle.identity().clone()) {
            Entry::Occupied(entry) => Err(Error::DuplicateIdentity(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(identity = %entry.key(), "Connection handle registered");
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Returns the handle for `identity`, or `Error::NotFound`.
    /// 返回 `identity` 对应的句柄，若不存在则返回 `Error::NotFound`。
    pub fn lookup(&self, identity: &DeviceId) -> Result<Arc<ConnectionHandle>> {
        self.get(identity).ok_or_else(|| Error::NotFound(identity.clone()))
    }

    pub fn get(&self, identity: &DeviceId) -> Option<Arc<ConnectionHandle>> {
        self.handles.get(identity).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, identity: &DeviceId) -> bool {
        self.handles.contains_key(identity)
    }

    /// Removes the entry for `identity` if present.
    /// 若存在则移除 `identity` 的条目。
    pub fn remove(&self, identity: &DeviceId) -> Option<Arc<ConnectionHandle>> {
        let removed = self.handles.remove(identity).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!(identity = %identity, "Connection handle removed");
        }
        removed
    }

    /// Removes the entry for the handle's identity only if it still points at
    /// this very handle. A newer handle registered under the same identity is
    /// left alone.
    ///
    /// 仅当条目仍指向该句柄本身时才移除。以相同身份注册的较新句柄不受影响。
    pub fn remove_handle(&self, handle: &ConnectionHandle) -> bool {
        let removed = self
            .handles
            .remove_if(handle.identity(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), handle)
            })
            .is_some();
        if removed {
            debug!(identity = %handle.identity(), "Connection handle removed");
        }
        removed
    }

    /// A snapshot of every registered handle, for fan-out.
    /// 所有已注册句柄的快照，用于扇出操作。
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.handles
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn identities(&self) -> Vec<DeviceId> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
