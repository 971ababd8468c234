pub mod device;
pub mod reading;

pub use device::{Device, DeviceMetadata};
pub use reading::{EntityAction, NormalizedReading, ReadingValue};
