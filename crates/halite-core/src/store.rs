// ── Reactive device store ──
//
// Thread-safe storage for pool controllers and their latest readings.
// Mutations bump a watch-channel version so consumers can await
// changes without polling the map.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{Device, NormalizedReading};

/// Reactive store for devices and their normalized readings.
///
/// Reads are wait-free; writes take `DashMap`'s per-shard locks. Every
/// device replacement bumps the version channel. Telemetry is always
/// swapped wholesale with the device, so a reader holding an
/// `Arc<Device>` sees one consistent snapshot.
pub struct DeviceStore {
    devices: DashMap<u64, Arc<Device>>,
    /// Last normalized reading per (device, telemetry key); the
    /// coordinator diffs against this to emit changed-only events.
    readings: DashMap<(u64, String), NormalizedReading>,
    version: watch::Sender<u64>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            devices: DashMap::new(),
            readings: DashMap::new(),
            version,
        }
    }

    /// Replace a device wholesale and notify subscribers.
    pub fn upsert(&self, device: Device) {
        self.devices.insert(device.id, Arc::new(device));
        self.bump();
    }

    pub fn get(&self, id: u64) -> Option<Arc<Device>> {
        self.devices.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.devices.contains_key(&id)
    }

    /// Snapshot of all devices, unordered.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        self.devices
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Subscribe to store versions; the value changes on every upsert.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Reading cache ────────────────────────────────────────────────

    /// Store a normalized reading, returning `true` when it differs
    /// from the previous cycle's value for the same key.
    pub fn record_reading(&self, device_id: u64, key: &str, reading: NormalizedReading) -> bool {
        let previous = self
            .readings
            .insert((device_id, key.to_owned()), reading.clone());
        previous.as_ref() != Some(&reading)
    }

    pub fn reading(&self, device_id: u64, key: &str) -> Option<NormalizedReading> {
        self.readings
            .get(&(device_id, key.to_owned()))
            .map(|entry| entry.value().clone())
    }

    /// Drop cached readings whose keys vanished from the telemetry.
    pub fn retain_readings<S: std::hash::BuildHasher>(
        &self,
        device_id: u64,
        live_keys: &std::collections::HashSet<String, S>,
    ) {
        self.readings
            .retain(|(id, key), _| *id != device_id || live_keys.contains(key));
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceMetadata, ReadingValue};
    use serde_json::Map;

    fn device(id: u64) -> Device {
        Device::new(
            id,
            DeviceMetadata {
                nickname: None,
                serial_number: Some(format!("SN-{id}")),
                model: None,
                firmware_version: None,
                extra: Map::new(),
            },
        )
    }

    #[test]
    fn upsert_bumps_version() {
        let store = DeviceStore::new();
        let mut rx = store.subscribe();
        assert_eq!(*rx.borrow_and_update(), 0);

        store.upsert(device(1));
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn record_reading_reports_change() {
        let store = DeviceStore::new();
        let reading = NormalizedReading::new(ReadingValue::Number(7.25));

        assert!(store.record_reading(1, "runtime-ph-value", reading.clone()));
        // Same value again: no change.
        assert!(!store.record_reading(1, "runtime-ph-value", reading));
        assert!(store.record_reading(
            1,
            "runtime-ph-value",
            NormalizedReading::new(ReadingValue::Number(7.30)),
        ));
    }

    #[test]
    fn retain_readings_drops_dead_keys() {
        let store = DeviceStore::new();
        store.record_reading(1, "a", NormalizedReading::new(ReadingValue::Number(1.0)));
        store.record_reading(1, "b", NormalizedReading::new(ReadingValue::Number(2.0)));
        store.record_reading(2, "a", NormalizedReading::new(ReadingValue::Number(3.0)));

        let live = std::collections::HashSet::from(["a".to_owned()]);
        store.retain_readings(1, &live);

        assert!(store.reading(1, "a").is_some());
        assert!(store.reading(1, "b").is_none());
        // Other devices untouched.
        assert!(store.reading(2, "a").is_some());
    }
}
