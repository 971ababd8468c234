// Entity description registry.
//
// One immutable record per telemetry/config key, grouped by kind for
// orchestrator lookup. The table is built once at startup; the
// automation-channel block expands through `channel_descriptions` with
// the index passed explicitly, so each channel's descriptions carry
// their own fully-substituted keys.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use strum::Display;
use thiserror::Error;

use crate::keys;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two descriptions claim the same telemetry key; the key would no
    /// longer resolve to a single raw field.
    #[error("duplicate entity description key: {key}")]
    DuplicateKey { key: String },
}

/// Host-platform entity kind a description maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Switch,
    Number,
    Select,
}

/// Grouping hint for the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// Decode selector applied by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueClass {
    /// Pass the raw value through untouched.
    #[default]
    Raw,
    /// Fixed-point with two fractional digits (2350 -> 23.50).
    Temperature,
    /// Fixed-point with the decimal after the first digit (725 -> 7.25).
    Ph,
    /// RCPI-to-dBm conversion.
    SignalStrength,
    /// Derived: salinity band classification.
    SalinityStatus,
    /// Derived: kilograms of salt needed to reach the preferred level.
    MissingSalt,
}

/// Display unit attached to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Ph,
    Millivolts,
    PartsPerMillion,
    Percent,
    CubicMeters,
    Kilograms,
    Hours,
    Minutes,
    Days,
    Decibels,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Ph => "pH",
            Self::Millivolts => "mV",
            Self::PartsPerMillion => "ppm",
            Self::Percent => "%",
            Self::CubicMeters => "m³",
            Self::Kilograms => "kg",
            Self::Hours => "h",
            Self::Minutes => "min",
            Self::Days => "d",
            Self::Decibels => "dB",
        }
    }
}

/// Data-driven applicability filter over the current telemetry.
///
/// Deliberately not a closure: channel descriptions are generated in a
/// loop, and a captured loop variable is exactly the late-binding bug
/// this table must not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    Always,
    /// Entity exists only while the telemetry map contains the key.
    RequiresKey(String),
    /// Entity exists only while the key holds a truthy value (non-zero,
    /// non-empty, not "false").
    RequiresTruthy(String),
}

impl Applicability {
    /// Evaluate against a device's current telemetry.
    pub fn matches(&self, telemetry: &Map<String, Value>) -> bool {
        match self {
            Self::Always => true,
            Self::RequiresKey(key) => telemetry.contains_key(key),
            Self::RequiresTruthy(key) => telemetry.get(key).is_some_and(is_truthy),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One declarative entity description. Immutable after registry build.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescription {
    pub key: String,
    pub name: String,
    pub kind: EntityKind,
    pub class: ValueClass,
    pub unit: Option<Unit>,
    pub category: Option<EntityCategory>,
    /// Raw value meaning "on" for binary/switch kinds (compared
    /// case-insensitively).
    pub on_value: Option<&'static str>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// Selectable options for select kinds.
    pub options: Vec<String>,
    pub icon: Option<&'static str>,
    pub applicability: Applicability,
}

impl EntityDescription {
    fn new(key: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            kind,
            class: ValueClass::Raw,
            unit: None,
            category: None,
            on_value: None,
            min: None,
            max: None,
            step: None,
            options: Vec::new(),
            icon: None,
            applicability: Applicability::Always,
        }
    }

    fn sensor(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(key, name, EntityKind::Sensor)
    }

    fn binary_sensor(key: impl Into<String>, name: impl Into<String>, on: &'static str) -> Self {
        let mut d = Self::new(key, name, EntityKind::BinarySensor);
        d.on_value = Some(on);
        d
    }

    fn switch(key: impl Into<String>, name: impl Into<String>, on: &'static str) -> Self {
        let mut d = Self::new(key, name, EntityKind::Switch);
        d.on_value = Some(on);
        d
    }

    fn number(key: impl Into<String>, name: impl Into<String>, min: f64, max: f64) -> Self {
        let mut d = Self::new(key, name, EntityKind::Number);
        d.min = Some(min);
        d.max = Some(max);
        d
    }

    fn select(key: impl Into<String>, name: impl Into<String>, options: Vec<String>) -> Self {
        let mut d = Self::new(key, name, EntityKind::Select);
        d.options = options;
        d
    }

    fn class(mut self, class: ValueClass) -> Self {
        self.class = class;
        self
    }

    fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    fn config(mut self) -> Self {
        self.category = Some(EntityCategory::Config);
        self
    }

    fn diagnostic(mut self) -> Self {
        self.category = Some(EntityCategory::Diagnostic);
        self
    }

    fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    fn when(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }
}

/// The static description table, keyed for kind lookup.
#[derive(Debug)]
pub struct EntityRegistry {
    by_kind: HashMap<EntityKind, Vec<Arc<EntityDescription>>>,
    all: Vec<Arc<EntityDescription>>,
}

impl EntityRegistry {
    /// Build the registry for a device revision with `channels`
    /// automation channels (7 on the shipping revision, 8 on the newer
    /// one). Fails if any two descriptions share a telemetry key.
    pub fn new(channels: u8) -> Result<Self, RegistryError> {
        let mut all: Vec<Arc<EntityDescription>> = default_descriptions()
            .into_iter()
            .map(Arc::new)
            .collect();

        for channel in 1..=channels {
            all.extend(channel_descriptions(channel).into_iter().map(Arc::new));
        }

        let mut seen = std::collections::HashSet::new();
        for description in &all {
            if !seen.insert(description.key.clone()) {
                return Err(RegistryError::DuplicateKey {
                    key: description.key.clone(),
                });
            }
        }

        let mut by_kind: HashMap<EntityKind, Vec<Arc<EntityDescription>>> = HashMap::new();
        for description in &all {
            by_kind
                .entry(description.kind)
                .or_default()
                .push(Arc::clone(description));
        }

        Ok(Self { by_kind, all })
    }

    /// All descriptions of one kind; empty slice if none.
    pub fn descriptions_for(&self, kind: EntityKind) -> &[Arc<EntityDescription>] {
        self.by_kind.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Every description, table order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescription>> {
        self.all.iter()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Look up a description by telemetry key.
    pub fn by_key(&self, key: &str) -> Option<&Arc<EntityDescription>> {
        self.all.iter().find(|d| d.key == key)
    }
}

/// The fixed (non-channel) description table.
#[allow(clippy::too_many_lines)]
fn default_descriptions() -> Vec<EntityDescription> {
    vec![
        EntityDescription::number(keys::CONFIG_USER_POWER, "Power on Cover Closed", 0.0, 100.0)
            .unit(Unit::Percent)
            .config()
            .icon("mdi:lock"),
        EntityDescription::number(
            keys::CONFIG_USER_COVER_POWER,
            "Power on Cover Opened",
            0.0,
            100.0,
        )
        .unit(Unit::Percent)
        .config()
        .icon("mdi:lock-open"),
        EntityDescription::number(keys::CONFIG_USER_PH, "PH", 6.5, 8.5)
            .step(0.1)
            .class(ValueClass::Ph)
            .unit(Unit::Ph)
            .config()
            .icon("mdi:ph"),
        EntityDescription::number(keys::CONFIG_USER_ORP, "ORP", 550.0, 800.0)
            .step(1.0)
            .unit(Unit::Millivolts)
            .config(),
        EntityDescription::sensor(keys::CONFIG_USER_CL, "Chlorine Level")
            .unit(Unit::Percent)
            .config(),
        EntityDescription::number(keys::CONFIG_TECHNICIAN_POOL_SIZE, "Pool Size", 1.0, 100.0)
            .step(1.0)
            .unit(Unit::CubicMeters)
            .config()
            .icon("mdi:move-resize"),
        EntityDescription::switch(
            keys::CONFIG_TECHNICIAN_ACID_PUMP_ENABLE,
            "Acid Pump Enabled",
            "1",
        )
        .config(),
        EntityDescription::binary_sensor(keys::IS_DEVICE_CONNECTED, "Connected", "true"),
        EntityDescription::switch(keys::RUNTIME_DEVICE_ON, "Power", "1"),
        EntityDescription::binary_sensor(keys::RUNTIME_DEVICE_TURBO, "Turbo", "1")
            .icon("mdi:truck-fast-outline"),
        EntityDescription::sensor(keys::RUNTIME_DEVICE_TURBO_TIME, "Turbo Time")
            .unit(Unit::Hours)
            .icon("mdi:truck-fast-outline"),
        EntityDescription::sensor(keys::RUNTIME_PH_VALUE, "PH")
            .class(ValueClass::Ph)
            .unit(Unit::Ph)
            .icon("mdi:ph"),
        EntityDescription::sensor(keys::RUNTIME_ORP_VALUE, "ORP").unit(Unit::Millivolts),
        EntityDescription::sensor(keys::RUNTIME_SALINITY_VALUE, "Salinity")
            .unit(Unit::PartsPerMillion)
            .icon("mdi:shaker-outline"),
        EntityDescription::sensor(keys::SALINITY_STATUS, "Salinity Status")
            .class(ValueClass::SalinityStatus)
            .icon("mdi:shaker-outline")
            .when(Applicability::RequiresKey(
                keys::RUNTIME_SALINITY_VALUE.into(),
            )),
        EntityDescription::sensor(keys::SALINITY_MISSING_SALT, "Missing Salt")
            .class(ValueClass::MissingSalt)
            .unit(Unit::Kilograms)
            .icon("mdi:shaker-outline")
            .when(Applicability::RequiresKey(
                keys::RUNTIME_SALINITY_VALUE.into(),
            )),
        EntityDescription::sensor(keys::RUNTIME_CPU_TEMPERATURE_VALUE, "CPU Temperature")
            .class(ValueClass::Temperature)
            .unit(Unit::Celsius)
            .diagnostic(),
        EntityDescription::sensor(keys::RUNTIME_BOARD_TEMPERATURE_VALUE, "Board Temperature")
            .class(ValueClass::Temperature)
            .unit(Unit::Celsius)
            .diagnostic(),
        EntityDescription::sensor(keys::RUNTIME_WATER_TEMPERATURE_VALUE, "Water Temperature")
            .class(ValueClass::Temperature)
            .unit(Unit::Celsius)
            .diagnostic()
            .icon("mdi:pool-thermometer"),
        EntityDescription::sensor(keys::RUNTIME_CELL_TEMPERATURE_VALUE, "Cell Temperature")
            .class(ValueClass::Temperature)
            .unit(Unit::Celsius)
            .diagnostic(),
        EntityDescription::sensor(keys::RUNTIME_ACID_PUMP_DAYS_LEFT, "Acid Pump Days Left")
            .unit(Unit::Days)
            .diagnostic()
            .icon("mdi:autorenew")
            .when(Applicability::RequiresTruthy(
                keys::CONFIG_TECHNICIAN_ACID_PUMP_ENABLE.into(),
            )),
        EntityDescription::sensor(keys::NETWORK_SSID, "SSID").diagnostic(),
        EntityDescription::sensor(keys::NETWORK_RCPI, "Signal")
            .class(ValueClass::SignalStrength)
            .unit(Unit::Decibels)
            .diagnostic(),
    ]
}

/// Descriptions for one automation channel, index passed explicitly.
fn channel_descriptions(channel: u8) -> Vec<EntityDescription> {
    let mode_key = keys::channel_key(keys::CONFIG_AUTOMATION_CHANNEL_MODE, channel);
    let state_key = keys::channel_key(keys::CONFIG_AUTOMATION_CHANNEL_STATE, channel);
    let runtime_state_key = keys::channel_key(keys::RUNTIME_AUTOMATION_CHANNEL_STATE, channel);
    let time_left_key = keys::channel_key(keys::RUNTIME_AUTOMATION_CHANNEL_TIME_LEFT, channel);

    vec![
        EntityDescription::select(
            mode_key.clone(),
            format!("Automation {channel} Mode"),
            vec!["0".into()],
        )
        .config()
        .when(Applicability::RequiresKey(mode_key)),
        EntityDescription::switch(state_key.clone(), format!("Automation {channel}"), "1")
            .config()
            .when(Applicability::RequiresKey(state_key)),
        EntityDescription::sensor(
            time_left_key.clone(),
            format!("Automation {channel} Time Left"),
        )
        .unit(Unit::Minutes)
        .diagnostic()
        .when(Applicability::RequiresKey(time_left_key)),
        EntityDescription::binary_sensor(
            runtime_state_key.clone(),
            format!("Automation {channel}"),
            "1",
        )
        .diagnostic()
        .when(Applicability::RequiresKey(runtime_state_key)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_builds_without_collisions() {
        let registry = EntityRegistry::new(7).expect("registry");
        // 23 fixed descriptions + 4 per channel.
        assert_eq!(registry.len(), 23 + 7 * 4);

        let registry8 = EntityRegistry::new(8).expect("registry");
        assert_eq!(registry8.len(), 23 + 8 * 4);
    }

    #[test]
    fn kinds_are_grouped() {
        let registry = EntityRegistry::new(7).expect("registry");

        assert_eq!(
            registry.descriptions_for(EntityKind::Select).len(),
            7,
            "one mode select per channel"
        );
        // Acid pump + power + 7 channel switches.
        assert_eq!(registry.descriptions_for(EntityKind::Switch).len(), 9);
        for description in registry.descriptions_for(EntityKind::Switch) {
            assert!(description.on_value.is_some());
        }
    }

    #[test]
    fn channel_descriptions_carry_substituted_keys() {
        let registry = EntityRegistry::new(7).expect("registry");
        let description = registry
            .by_key("config-automation-channel3-mode")
            .expect("channel 3 mode");
        assert_eq!(description.kind, EntityKind::Select);
        assert_eq!(
            description.applicability,
            Applicability::RequiresKey("config-automation-channel3-mode".into())
        );
    }

    #[test]
    fn applicability_filters_on_telemetry() {
        let telemetry = json!({
            "config-technician-acidPump-enable": "0",
            "config-automation-channel1-mode": 2,
        });
        let Some(telemetry) = telemetry.as_object() else {
            panic!("object");
        };

        assert!(Applicability::Always.matches(telemetry));
        assert!(
            Applicability::RequiresKey("config-automation-channel1-mode".into())
                .matches(telemetry)
        );
        assert!(!Applicability::RequiresKey("config-automation-channel2-mode".into())
            .matches(telemetry));
        assert!(!Applicability::RequiresTruthy(
            "config-technician-acidPump-enable".into()
        )
        .matches(telemetry));
    }

    #[test]
    fn truthiness_rules() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("1")));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }
}
