// State normalizer: raw vendor telemetry to typed readings.
//
// All functions are pure. The coordinator re-runs them over the full
// description table every poll cycle and diffs the results, so nothing
// in here may hold state.

use serde_json::{json, Map, Value};
use strum::{Display, EnumString};

use crate::descriptions::{EntityDescription, EntityKind, ValueClass};
use crate::keys;
use crate::model::{EntityAction, NormalizedReading, ReadingValue};

/// Preferred salinity in ppm; the missing-salt estimate targets this.
pub const SALINITY_PREFERRED: f64 = 4000.0;
pub const SALINITY_NORMAL_LOW: f64 = 3600.0;
pub const SALINITY_NORMAL_HIGH: f64 = 4200.0;
pub const SALINITY_MIN: f64 = 3000.0;
pub const SALINITY_MAX: f64 = 4500.0;
/// Kilograms of salt that raise one cubic meter by the preferred level.
pub const SALT_WEIGHT_PER_CUBIC_METER: f64 = 4.0;

const SWITCH_ACTIONS: &[EntityAction] = &[
    EntityAction::TurnOn,
    EntityAction::TurnOff,
    EntityAction::Toggle,
];
const SELECT_ACTIONS: &[EntityAction] = &[EntityAction::SelectOption];
const NUMBER_ACTIONS: &[EntityAction] = &[EntityAction::SetNativeValue];

/// Salinity band relative to the recommended operating range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SalinityStatus {
    VeryLow,
    NormalLow,
    Ok,
    NormalHigh,
    VeryHigh,
}

/// Decode the vendor's fixed-point temperature encoding: the last two
/// digits are hundredths (2350 -> 23.50, 205 -> 2.05).
pub fn decode_temperature(raw: i64) -> f64 {
    let whole = raw / 100;
    let fraction = raw % 100;
    whole as f64 + fraction as f64 / 100.0
}

/// Inverse of [`decode_temperature`], for writes.
pub fn encode_temperature(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Decode the vendor's pH encoding: the decimal point sits after the
/// first digit (725 -> 7.25, 68 -> 6.80).
pub fn decode_ph(raw: i64) -> f64 {
    if raw <= 0 {
        return 0.0;
    }
    let mut scale = 1.0;
    let mut rest = raw / 10;
    while rest > 0 {
        scale *= 10.0;
        rest /= 10;
    }
    raw as f64 / scale
}

/// RCPI to dBm: `raw / 2 - 110` (40 -> -90).
pub fn signal_strength_dbm(raw: f64) -> f64 {
    raw / 2.0 - 110.0
}

/// Classify a salinity reading. Bands are evaluated in a fixed order
/// with inclusive bounds, so the boundary values land in the wider
/// band: 3600 and 4200 are ok, 3000 is normal_low, 4500 is normal_high.
pub fn classify_salinity(salinity: f64) -> SalinityStatus {
    if (SALINITY_NORMAL_LOW..=SALINITY_NORMAL_HIGH).contains(&salinity) {
        SalinityStatus::Ok
    } else if (SALINITY_NORMAL_HIGH..=SALINITY_MAX).contains(&salinity) {
        SalinityStatus::NormalHigh
    } else if (SALINITY_MIN..=SALINITY_NORMAL_LOW).contains(&salinity) {
        SalinityStatus::NormalLow
    } else if salinity > SALINITY_MAX {
        SalinityStatus::VeryHigh
    } else {
        SalinityStatus::VeryLow
    }
}

/// Kilograms of salt needed to bring the pool to the preferred level,
/// rounded to three decimals. Negative when over-salted.
pub fn missing_salt(pool_size: f64, salinity: f64) -> f64 {
    let kg = pool_size * SALT_WEIGHT_PER_CUBIC_METER * (1.0 - salinity / SALINITY_PREFERRED);
    (kg * 1000.0).round() / 1000.0
}

/// Derive the typed reading for one description from the device's
/// current telemetry. `None` when the backing key is absent (or, for
/// derived readings, an input is missing or non-numeric).
pub fn normalize(
    description: &EntityDescription,
    telemetry: &Map<String, Value>,
) -> Option<NormalizedReading> {
    match description.class {
        ValueClass::SalinityStatus => {
            let salinity = numeric(telemetry.get(keys::RUNTIME_SALINITY_VALUE)?)?;
            let status = classify_salinity(salinity);
            let mut reading =
                NormalizedReading::new(ReadingValue::Text(status.to_string()));
            reading
                .attributes
                .insert("salinity".to_owned(), json!(salinity));
            // Out-of-range bands override the shaker icon with a warning.
            if matches!(status, SalinityStatus::VeryLow | SalinityStatus::VeryHigh) {
                reading.icon = Some("mdi:alert-outline".to_owned());
            }
            return Some(reading);
        }
        ValueClass::MissingSalt => {
            let salinity = numeric(telemetry.get(keys::RUNTIME_SALINITY_VALUE)?)?;
            let pool_size = numeric(telemetry.get(keys::CONFIG_TECHNICIAN_POOL_SIZE)?)?;
            let mut reading = NormalizedReading::new(ReadingValue::Number(missing_salt(
                pool_size, salinity,
            )));
            reading
                .attributes
                .insert("salinity".to_owned(), json!(salinity));
            reading
                .attributes
                .insert("poolSize".to_owned(), json!(pool_size));
            return Some(reading);
        }
        _ => {}
    }

    let raw = telemetry.get(&description.key)?;

    let reading = match description.kind {
        EntityKind::BinarySensor | EntityKind::Switch => {
            let on = description.on_value.unwrap_or("1");
            let state = text(raw).eq_ignore_ascii_case(on);
            let mut reading = NormalizedReading::new(ReadingValue::Bool(state));
            if description.kind == EntityKind::Switch {
                reading = reading.with_actions(SWITCH_ACTIONS);
            }
            reading
        }
        EntityKind::Select => NormalizedReading::new(ReadingValue::Text(text(raw)))
            .with_actions(SELECT_ACTIONS),
        EntityKind::Number => {
            NormalizedReading::new(decode_value(description.class, raw)?)
                .with_actions(NUMBER_ACTIONS)
        }
        EntityKind::Sensor => NormalizedReading::new(decode_value(description.class, raw)?),
    };

    Some(reading)
}

fn decode_value(class: ValueClass, raw: &Value) -> Option<ReadingValue> {
    match class {
        ValueClass::Temperature => {
            let raw = numeric(raw)?;
            Some(ReadingValue::Number(decode_temperature(raw.round() as i64)))
        }
        ValueClass::Ph => {
            let raw = numeric(raw)?;
            Some(ReadingValue::Number(decode_ph(raw.round() as i64)))
        }
        ValueClass::SignalStrength => Some(ReadingValue::Number(signal_strength_dbm(numeric(
            raw,
        )?))),
        ValueClass::Raw => Some(match numeric(raw) {
            Some(n) => ReadingValue::Number(n),
            None => ReadingValue::Text(text(raw)),
        }),
        // Handled before the key lookup.
        ValueClass::SalinityStatus | ValueClass::MissingSalt => None,
    }
}

/// Numeric view of a raw value; the vendor serializes numbers both as
/// JSON numbers and as strings.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
