// Canonical device model.

use serde_json::{Map, Value};

use halite_api::models::DeviceRecord;

/// Static device metadata from the account device list.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetadata {
    pub nickname: Option<String>,
    pub serial_number: Option<String>,
    /// Vendor model designation (e.g. "G+").
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    /// Remaining vendor fields, kept for diagnostics.
    pub extra: Map<String, Value>,
}

impl From<&DeviceRecord> for DeviceMetadata {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            nickname: record.nickname.clone(),
            serial_number: record.serial_number.clone(),
            model: record.device_type.clone(),
            firmware_version: record.firmware_version.clone(),
            extra: record.extra.clone(),
        }
    }
}

/// One pool controller: metadata plus the latest raw telemetry.
///
/// Telemetry is `None` until the first successful status fetch and
/// whenever the vendor reports the device unavailable. Each successful
/// fetch replaces the map wholesale — readers always see a complete,
/// consistent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: u64,
    pub metadata: DeviceMetadata,
    pub telemetry: Option<Map<String, Value>>,
}

impl Device {
    pub fn new(id: u64, metadata: DeviceMetadata) -> Self {
        Self {
            id,
            metadata,
            telemetry: None,
        }
    }

    /// Display name: nickname if set, serial number otherwise.
    pub fn name(&self) -> &str {
        self.metadata
            .nickname
            .as_deref()
            .or(self.metadata.serial_number.as_deref())
            .unwrap_or("pool controller")
    }

    /// Raw value for a telemetry key, if the device has reported it.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.telemetry.as_ref()?.get(key)
    }
}
