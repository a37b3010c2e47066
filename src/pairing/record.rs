//! 持久化的配对记录和配置条目。
//! Persisted pairing records and the config entries that carry them.

use crate::error::Result;
use crate::registry::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The pairing data persisted for one accessory.
///
/// Only the fields the lifecycle needs are typed; every other persisted key
/// (long-term keys, transport hints) is kept verbatim in `extra` so the
/// record survives a round trip untouched.
///
/// 为单个配件持久化的配对数据。
///
/// 只有生命周期需要的字段是强类型的；其余持久化键（长期密钥、传输提示）原样保存在 `extra` 中。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingRecord {
    #[serde(rename = "AccessoryPairingID")]
    pub accessory_pairing_id: String,

    #[serde(rename = "AccessoryIP", default, skip_serializing_if = "Option::is_none")]
    pub accessory_ip: Option<String>,

    #[serde(rename = "AccessoryPort", default, skip_serializing_if = "Option::is_none")]
    pub accessory_port: Option<u16>,

    #[serde(rename = "Connection", default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PairingRecord {
    /// Creates a record holding only a pairing id.
    /// 创建一个只包含配对 id 的记录。
    pub fn new(accessory_pairing_id: impl Into<String>) -> Self {
        Self {
            accessory_pairing_id: accessory_pairing_id.into(),
            accessory_ip: None,
            accessory_port: None,
            connection: None,
            extra: Map::new(),
        }
    }

    /// Parses a record from its persisted JSON form.
    /// 从持久化的 JSON 形式解析记录。
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parses a record from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// The normalized identity of the accessory this record pairs with.
    /// 该记录所配对配件的规范化身份。
    pub fn identity(&self) -> DeviceId {
        DeviceId::new(&self.accessory_pairing_id)
    }
}

// Long-term keys live in `extra`; only their names are printed.
impl fmt::Debug for PairingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingRecord")
            .field("accessory_pairing_id", &self.accessory_pairing_id)
            .field("accessory_ip", &self.accessory_ip)
            .field("accessory_port", &self.accessory_port)
            .field("connection", &self.connection)
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A configuration entry as handed over by the configuration source.
///
/// 由配置源交付的配置条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    pub data: PairingRecord,
}

impl ConfigEntry {
    pub fn new(entry_id: impl Into<String>, title: impl Into<String>, data: PairingRecord) -> Self {
        Self {
            entry_id: entry_id.into(),
            title: title.into(),
            unique_id: None,
            data,
        }
    }

    /// Fills in `unique_id` from the normalized pairing id for entries that
    /// were created before unique ids were recorded. Returns `true` if the
    /// entry changed and should be persisted again.
    ///
    /// 为记录唯一 id 之前创建的条目，用规范化的配对 id 填充 `unique_id`。
    /// 若条目发生变化并应重新持久化，则返回 `true`。
    pub fn backfill_unique_id(&mut self) -> bool {
        if self.unique_id.is_some() {
            return false;
        }
        self.unique_id = Some(self.data.identity().as_str().to_string());
        true
    }
}
