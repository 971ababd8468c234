// Vendor telemetry keys.
//
// Keys are dash-separated paths into the device's nested status
// document, flattened by the cloud API. The `{N}` templates expand to
// one key per automation channel.

pub const CONFIG_USER_POWER: &str = "config-user-power";
pub const CONFIG_USER_COVER_POWER: &str = "config-user-coverPower";
pub const CONFIG_USER_PH: &str = "config-user-ph";
pub const CONFIG_USER_ORP: &str = "config-user-orp";
pub const CONFIG_USER_CL: &str = "config-user-cl";
pub const CONFIG_TECHNICIAN_POOL_SIZE: &str = "config-technician-poolSize";
pub const CONFIG_TECHNICIAN_ACID_PUMP_ENABLE: &str = "config-technician-acidPump-enable";

pub const IS_DEVICE_CONNECTED: &str = "isDeviceConnected";

pub const RUNTIME_DEVICE_ON: &str = "runtime-device-on";
pub const RUNTIME_DEVICE_TURBO: &str = "runtime-device-turbo";
pub const RUNTIME_DEVICE_TURBO_TIME: &str = "runtime-device-turboTime";
pub const RUNTIME_PH_VALUE: &str = "runtime-ph-value";
pub const RUNTIME_ORP_VALUE: &str = "runtime-orp-value";
pub const RUNTIME_SALINITY_VALUE: &str = "runtime-salinity-value";
pub const RUNTIME_CPU_TEMPERATURE_VALUE: &str = "runtime-cpuTemperature-value";
pub const RUNTIME_BOARD_TEMPERATURE_VALUE: &str = "runtime-boardTemperature-value";
pub const RUNTIME_WATER_TEMPERATURE_VALUE: &str = "runtime-waterTemperature-value";
pub const RUNTIME_CELL_TEMPERATURE_VALUE: &str = "runtime-cell-temperature-value";
pub const RUNTIME_ACID_PUMP_DAYS_LEFT: &str = "runtime-acidPump-daysLeft";

pub const NETWORK_SSID: &str = "network-ssid";
pub const NETWORK_RCPI: &str = "network-rcpi";

// Derived readings with no direct telemetry field; computed by the
// normalizer from salinity and pool size.
pub const SALINITY_STATUS: &str = "runtime-salinity-status";
pub const SALINITY_MISSING_SALT: &str = "runtime-salinity-missingSalt";

// Per-channel templates, `{N}` replaced with the channel index.
pub const CONFIG_AUTOMATION_CHANNEL_MODE: &str = "config-automation-channel{N}-mode";
pub const CONFIG_AUTOMATION_CHANNEL_STATE: &str = "config-automation-channel{N}-state";
pub const RUNTIME_AUTOMATION_CHANNEL_STATE: &str = "runtime-automationState-channel{N}-state";
pub const RUNTIME_AUTOMATION_CHANNEL_TIME_LEFT: &str =
    "runtime-automationState-channel{N}-timeLeft";

/// Expand a `{N}` template for one automation channel.
pub fn channel_key(template: &str, channel: u8) -> String {
    template.replace("{N}", &channel.to_string())
}
