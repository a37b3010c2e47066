//! Device triggers known to the process, keyed by trigger key.
//!
//! The entity layer fills this in; the lifecycle only drops a device's
//! triggers when its connection unloads and clears the lot on shutdown.

use crate::registry::DeviceId;
use dashmap::DashMap;

/// 触发器元数据
/// Trigger metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub identity: DeviceId,
    pub subtype: String,
}

#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: DashMap<String, TriggerInfo>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, info: TriggerInfo) -> Option<TriggerInfo> {
        self.triggers.insert(key.into(), info)
    }

    pub fn get(&self, key: &str) -> Option<TriggerInfo> {
        self.triggers.get(key).map(|entry| entry.value().clone())
    }

    /// Drops every trigger belonging to `identity` and returns how many went.
    /// 删除属于 `identity` 的所有触发器，并返回删除的数量。
    pub fn remove_device(&self, identity: &DeviceId) -> usize {
        let before = self.triggers.len();
        self.triggers.retain(|_, info| &info.identity != identity);
        before - self.triggers.len()
    }

    pub fn clear(&self) {
        self.triggers.clear();
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
