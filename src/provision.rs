//! Thread provisioning: payload validation and dispatch to a live connection.
//!
//! Thread 配网：载荷校验并分派到在线连接。

use crate::error::{Result, ValidationError};
use crate::registry::{ConnectionRegistry, DeviceId};
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{info, warn};

pub const ATTR_HKID: &str = "hkid";
pub const ATTR_THREAD_NETWORK_NAME: &str = "network_name";
pub const ATTR_THREAD_CHANNEL: &str = "channel";
pub const ATTR_THREAD_PAN_ID: &str = "pan_id";
pub const ATTR_THREAD_EXTENDED_PAN_ID: &str = "extended_pan_id";
pub const ATTR_THREAD_NETWORK_KEY: &str = "network_key";
pub const ATTR_THREAD_UNKNOWN_FLAG: &str = "unknown";

const NETWORK_NAME_LEN: RangeInclusive<usize> = 0..=16;
const CHANNEL_RANGE: RangeInclusive<u64> = 11..=26;
const PAN_ID_LEN: RangeInclusive<usize> = 1..=4;
const EXTENDED_PAN_ID_LEN: RangeInclusive<usize> = 1..=16;
const NETWORK_KEY_LEN: RangeInclusive<usize> = 1..=32;
const UNKNOWN_FLAG_RANGE: RangeInclusive<u64> = 0..=255;

/// Thread network credentials handed to an accessory.
///
/// `Debug` never prints the network key.
///
/// 下发给配件的 Thread 网络凭据。`Debug` 输出中不会包含网络密钥。
pub struct ThreadCredentials {
    pub network_name: String,
    pub channel: u8,
    pub pan_id: String,
    pub extended_pan_id: String,
    pub network_key: SecretString,
    pub unknown_flag: u8,
}

impl ThreadCredentials {
    /// Checks every field against the accepted ranges.
    /// 根据可接受的范围校验每个字段。
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        use secrecy::ExposeSecret;

        check_len(ATTR_THREAD_NETWORK_NAME, &self.network_name, NETWORK_NAME_LEN)?;
        check_range(ATTR_THREAD_CHANNEL, u64::from(self.channel), CHANNEL_RANGE)?;
        check_len(ATTR_THREAD_PAN_ID, &self.pan_id, PAN_ID_LEN)?;
        check_len(
            ATTR_THREAD_EXTENDED_PAN_ID,
            &self.extended_pan_id,
            EXTENDED_PAN_ID_LEN,
        )?;
        check_len(
            ATTR_THREAD_NETWORK_KEY,
            self.network_key.expose_secret(),
            NETWORK_KEY_LEN,
        )?;
        Ok(())
    }
}

impl fmt::Debug for ThreadCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCredentials")
            .field("network_name", &self.network_name)
            .field("channel", &self.channel)
            .field("pan_id", &self.pan_id)
            .field("extended_pan_id", &self.extended_pan_id)
            .field("network_key", &"REDACTED")
            .field("unknown_flag", &self.unknown_flag)
            .finish()
    }
}

/// A validated provisioning request for one accessory.
///
/// Only constructible through validation, so holding one means every field
/// is in range.
///
/// 针对单个配件、已通过校验的配网请求。只能通过校验构造，因此持有它即表示所有字段均在范围内。
#[derive(Debug)]
pub struct ThreadProvisionRequest {
    identity: DeviceId,
    credentials: ThreadCredentials,
}

impl ThreadProvisionRequest {
    pub fn new(
        hkid: &str,
        credentials: ThreadCredentials,
    ) -> std::result::Result<Self, ValidationError> {
        credentials.validate()?;
        Ok(Self {
            identity: DeviceId::new(hkid),
            credentials,
        })
    }

    /// Parses and validates the command payload.
    ///
    /// String fields accept strings, numbers or booleans, stringified.
    /// Integer fields accept non-negative numbers (fractions truncate) or
    /// strings holding a non-negative integer.
    ///
    /// 解析并校验命令载荷。字符串字段接受字符串、数字或布尔值（转换为字符串）；
    /// 整数字段接受非负数字（小数部分截断）或包含非负整数的字符串。
    pub fn from_payload(payload: &Value) -> std::result::Result<Self, ValidationError> {
        let fields = payload.as_object().ok_or(ValidationError::WrongType {
            field: "payload",
            expected: "object",
        })?;

        let hkid = string_field(fields, ATTR_HKID)?;
        let channel = int_field(fields, ATTR_THREAD_CHANNEL)?;
        check_range(ATTR_THREAD_CHANNEL, channel, CHANNEL_RANGE)?;
        let unknown = int_field(fields, ATTR_THREAD_UNKNOWN_FLAG)?;
        check_range(ATTR_THREAD_UNKNOWN_FLAG, unknown, UNKNOWN_FLAG_RANGE)?;

        let credentials = ThreadCredentials {
            network_name: string_field(fields, ATTR_THREAD_NETWORK_NAME)?,
            channel: narrow(ATTR_THREAD_CHANNEL, channel, CHANNEL_RANGE)?,
            pan_id: string_field(fields, ATTR_THREAD_PAN_ID)?,
            extended_pan_id: string_field(fields, ATTR_THREAD_EXTENDED_PAN_ID)?,
            network_key: SecretString::from(string_field(fields, ATTR_THREAD_NETWORK_KEY)?),
            unknown_flag: narrow(ATTR_THREAD_UNKNOWN_FLAG, unknown, UNKNOWN_FLAG_RANGE)?,
        };
        Self::new(&hkid, credentials)
    }

    pub fn identity(&self) -> &DeviceId {
        &self.identity
    }

    pub fn credentials(&self) -> &ThreadCredentials {
        &self.credentials
    }
}

/// Forwards provisioning requests to registered connections.
///
/// Only ever reads the registry.
///
/// 将配网请求转发给已注册的连接。只读取注册表。
pub struct ProvisioningDispatcher<'a> {
    registry: &'a ConnectionRegistry,
}

impl<'a> ProvisioningDispatcher<'a> {
    pub fn new(registry: &'a ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Sends the credentials to the target accessory.
    ///
    /// An unknown target is logged and ignored. A client failure is returned
    /// unchanged as `Error::Pairing`.
    ///
    /// 将凭据发送给目标配件。未知目标只记录日志并忽略；客户端失败原样以 `Error::Pairing` 返回。
    pub async fn dispatch(&self, request: &ThreadProvisionRequest) -> Result<()> {
        let credentials = &request.credentials;
        info!(
            hkid = %request.identity,
            network_name = %credentials.network_name,
            channel = credentials.channel,
            pan_id = %credentials.pan_id,
            extended_pan_id = %credentials.extended_pan_id,
            network_key = "REDACTED",
            unknown = credentials.unknown_flag,
            "Provisioning Thread credentials"
        );

        let Some(handle) = self.registry.get(&request.identity) else {
            warn!(hkid = %request.identity, "Unknown HKID, ignoring Thread provisioning request");
            return Ok(());
        };

        handle.client().thread_provision(credentials).await?;
        info!(hkid = %request.identity, "Thread credentials provisioned");
        Ok(())
    }

    /// Validates a raw command payload, then dispatches it.
    /// 校验原始命令载荷，然后分派。
    pub async fn dispatch_payload(&self, payload: &Value) -> Result<()> {
        let request = ThreadProvisionRequest::from_payload(payload)?;
        self.dispatch(&request).await
    }
}

fn string_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> std::result::Result<String, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(ValidationError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn int_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> std::result::Result<u64, ValidationError> {
    let wrong_type = ValidationError::WrongType {
        field,
        expected: "non-negative integer",
    };
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => Ok(v),
            // Fractional values truncate toward zero.
            (None, Some(f)) if f.is_finite() && f >= 0.0 => Ok(f as u64),
            _ => Err(wrong_type),
        },
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| wrong_type),
        Some(_) => Err(wrong_type),
    }
}

fn check_len(
    field: &'static str,
    value: &str,
    allowed: RangeInclusive<usize>,
) -> std::result::Result<(), ValidationError> {
    let len = value.chars().count();
    if allowed.contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::Length {
            field,
            min: *allowed.start(),
            max: *allowed.end(),
            len,
        })
    }
}

fn check_range(
    field: &'static str,
    value: u64,
    allowed: RangeInclusive<u64>,
) -> std::result::Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::Range {
            field,
            min: *allowed.start(),
            max: *allowed.end(),
            value,
        })
    }
}

fn narrow(
    field: &'static str,
    value: u64,
    allowed: RangeInclusive<u64>,
) -> std::result::Result<u8, ValidationError> {
    u8::try_from(value).map_err(|_| ValidationError::Range {
        field,
        min: *allowed.start(),
        max: *allowed.end(),
        value,
    })
}
