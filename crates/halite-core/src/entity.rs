// Entity seam for host-platform glue.
//
// Host integrations hold one handle per (device, description) pair and
// read state or push actions through it. Composition over a trait —
// the handle owns nothing but references into the coordinator.

use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::Coordinator;
use crate::descriptions::EntityDescription;
use crate::error::CoreError;
use crate::model::{EntityAction, NormalizedReading};

/// One addressable entity: a reading source plus an action sink.
pub trait PoolEntity {
    /// Stable identifier for host-side registries.
    fn unique_id(&self) -> String;

    fn description(&self) -> &EntityDescription;

    /// Latest normalized reading, if the device has reported one.
    fn current_reading(&self) -> Option<NormalizedReading>;

    /// Whether the entity should exist given current telemetry.
    fn is_applicable(&self) -> bool;

    fn apply_action(
        &self,
        action: EntityAction,
        argument: Option<Value>,
    ) -> impl std::future::Future<Output = Result<(), CoreError>> + Send;
}

/// Concrete entity bound to a coordinator and one description.
#[derive(Clone)]
pub struct EntityHandle {
    coordinator: Coordinator,
    device_id: u64,
    description: Arc<EntityDescription>,
}

impl EntityHandle {
    pub fn new(
        coordinator: Coordinator,
        device_id: u64,
        description: Arc<EntityDescription>,
    ) -> Self {
        Self {
            coordinator,
            device_id,
            description,
        }
    }

    /// Handles for every description applicable to a device right now.
    pub fn for_device(coordinator: &Coordinator, device_id: u64) -> Vec<Self> {
        let Some(device) = coordinator.store().get(device_id) else {
            return Vec::new();
        };
        let Some(telemetry) = &device.telemetry else {
            return Vec::new();
        };

        coordinator
            .registry()
            .iter()
            .filter(|description| description.applicability.matches(telemetry))
            .map(|description| {
                Self::new(coordinator.clone(), device_id, Arc::clone(description))
            })
            .collect()
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }
}

impl PoolEntity for EntityHandle {
    /// `{kind}_{serial}_{key}`, slugified the way host platforms expect.
    fn unique_id(&self) -> String {
        let serial = self
            .coordinator
            .store()
            .get(self.device_id)
            .and_then(|device| device.metadata.serial_number.clone())
            .unwrap_or_else(|| self.device_id.to_string());
        slugify(&format!(
            "{}_{}_{}",
            self.description.kind, serial, self.description.key
        ))
    }

    fn description(&self) -> &EntityDescription {
        &self.description
    }

    fn current_reading(&self) -> Option<NormalizedReading> {
        self.coordinator
            .store()
            .reading(self.device_id, &self.description.key)
    }

    fn is_applicable(&self) -> bool {
        self.coordinator
            .store()
            .get(self.device_id)
            .and_then(|device| device.telemetry.clone())
            .is_some_and(|telemetry| self.description.applicability.matches(&telemetry))
    }

    async fn apply_action(
        &self,
        action: EntityAction,
        argument: Option<Value>,
    ) -> Result<(), CoreError> {
        self.coordinator
            .execute_action(self.device_id, &self.description.key, action, argument)
            .await
    }
}

/// Lowercase, with every non-alphanumeric run collapsed to one `_`.
fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}
