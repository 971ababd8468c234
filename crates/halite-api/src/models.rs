// Wire models for the vendor cloud API.
//
// The vendor envelope is `{ success, message?, token?, data? }` on every
// endpoint; only the shape of `data` differs. Telemetry stays an opaque
// JSON map — decoding raw values is halite-core's job.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope returned by `POST /login` and `GET /check-token`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthEnvelope {
    #[serde(default)]
    pub success: bool,

    /// Human-readable status, not always present on success.
    #[serde(default)]
    pub message: Option<String>,

    /// Session token — present on login, absent on check-token.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub data: Option<AccountData>,
}

/// Account payload carried by the auth envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    /// Member profile (email, phone, owner id, ...). Kept opaque —
    /// only diagnostics consume it, and redacted at that.
    #[serde(default)]
    pub member: Option<Value>,

    #[serde(default)]
    pub owned_devices: Vec<DeviceRecord>,

    /// Devices shared with this account by another owner.
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

impl AccountData {
    /// Owned and shared devices as one list, owned first.
    pub fn all_devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.owned_devices.iter().chain(self.devices.iter())
    }
}

/// One device entry from the account device list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: u64,

    #[serde(default)]
    pub nickname: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub device_type: Option<String>,

    #[serde(default, rename = "firmware-main-current")]
    pub firmware_version: Option<String>,

    /// Remaining vendor metadata fields, preserved for diagnostics.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope returned by `GET /device-status` and `POST /device-update`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,

    /// Raw telemetry map: vendor key -> raw value.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}
