// halite-core: domain layer between halite-api and host integrations.
//
// Owns the entity-description registry, the raw-to-typed normalizer,
// the reactive device store, and the polling coordinator.

pub mod coordinator;
pub mod descriptions;
pub mod diagnostics;
pub mod entity;
pub mod error;
pub mod keys;
pub mod model;
pub mod normalize;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, PollState, DEFAULT_POLL_INTERVAL,
    MAX_ATTEMPTS, RETRY_DELAY,
};
pub use descriptions::{
    Applicability, EntityCategory, EntityDescription, EntityKind, EntityRegistry, RegistryError,
    Unit, ValueClass,
};
pub use entity::{EntityHandle, PoolEntity};
pub use error::CoreError;
pub use model::{Device, DeviceMetadata, EntityAction, NormalizedReading, ReadingValue};
pub use normalize::SalinityStatus;
pub use store::DeviceStore;
