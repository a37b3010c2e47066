//! Stable identifiers by which a pairing's accessories are known elsewhere.

use super::LifecycleManager;
use crate::error::Result;
use crate::registry::DeviceId;
use std::collections::BTreeSet;

/// One `(domain, id)` device identifier.
/// 一个 `(domain, id)` 设备标识符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentifier {
    pub domain: String,
    pub id: String,
}

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            id: id.into(),
        }
    }

    /// The identifier of accessory `aid` behind pairing `identity`.
    pub fn for_accessory(domain: &str, identity: &DeviceId, aid: u64) -> Self {
        Self::new(domain, format!("{identity}:aid:{aid}"))
    }
}

impl LifecycleManager {
    /// The identifiers of every accessory the registered pairing exposes.
    ///
    /// 已注册配对所暴露的每个配件的标识符。
    pub fn device_identifiers(
        &self,
        pairing_id: &str,
    ) -> Result<BTreeSet<DeviceIdentifier>> {
        let identity = DeviceId::new(pairing_id);
        let handle = self.inner.registry.lookup(&identity)?;
        let domain = &self.inner.config.identifier_domain;

        Ok(handle
            .client()
            .accessory_ids()
            .into_iter()
            .map(|aid| DeviceIdentifier::for_accessory(domain, &identity, aid))
            .collect())
    }

    /// Whether a generic "remove device" request for a device known by
    /// `device_identifiers` may go ahead, i.e. the device is not one of this
    /// pairing's accessories.
    ///
    /// 针对以 `device_identifiers` 标识的设备的通用“移除设备”请求是否可以执行，
    /// 即该设备不属于此配对的配件。
    pub fn can_remove_device<'a, I>(&self, pairing_id: &str, device_identifiers: I) -> Result<bool>
    where
        I: IntoIterator<Item = &'a DeviceIdentifier>,
    {
        let ours = self.device_identifiers(pairing_id)?;
        Ok(!device_identifiers.into_iter().any(|id| ours.contains(id)))
    }
}
