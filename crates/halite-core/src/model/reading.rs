// Normalized entity readings and the actions they expose.

use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Action names routed from the host platform to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EntityAction {
    TurnOn,
    TurnOff,
    Toggle,
    SelectOption,
    SetNativeValue,
}

/// Typed value of a normalized reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ReadingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// One entity's decoded state for the current poll cycle.
///
/// Derived fresh from raw telemetry every cycle and diffed against the
/// previous cycle's reading — never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub value: ReadingValue,

    /// Extra state attributes surfaced alongside the value.
    pub attributes: Map<String, Value>,

    /// Icon override for value-dependent icons.
    pub icon: Option<String>,

    /// Actions this entity accepts, by kind.
    pub actions: &'static [EntityAction],
}

impl NormalizedReading {
    pub fn new(value: ReadingValue) -> Self {
        Self {
            value,
            attributes: Map::new(),
            icon: None,
            actions: &[],
        }
    }

    pub fn with_actions(mut self, actions: &'static [EntityAction]) -> Self {
        self.actions = actions;
        self
    }

    /// Whether the named action is available on this reading.
    pub fn supports(&self, action: EntityAction) -> bool {
        self.actions.contains(&action)
    }
}
