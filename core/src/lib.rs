use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub mod instance;
pub use instance::{Emitter, InputBehavior, InputCx, ModuleInstance, OutputBehavior, OutputCx};

pub mod registry;
pub use registry::{
    load_interactions, AvailableModule, LoadError, ModuleEntry, ModuleFactory, ModuleRegistry,
};

pub mod router;
pub use router::{Connection, Router, SharedRouter};

pub mod patchboard;
pub use patchboard::Patchboard;

// Re-export the shared leaf types so downstream module crates only need one
// dependency for the common vocabulary.
pub use ondine_signals::{
    null_sink, DeliveryMode, Event, FieldDesc, FieldType, LogEntry, LogLevel, LogSink,
    ModuleConfig, ModuleKind, ModuleManifest,
};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// One side of a persisted interaction: which module type to instantiate,
/// with which configuration, and (since interactions gained durable instance
/// identity) which specific instance the side is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InteractionSide {
    /// Module type name (the manifest display name).
    pub module: String,
    /// Stable identifier of the bound instance, assigned at creation.
    /// Absent in legacy files, where resolution falls back to name+config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Uuid>,
    /// Instance configuration. Must be a JSON object to be well-formed.
    #[serde(default)]
    pub config: Value,
}

impl InteractionSide {
    pub fn new(module: &str, config: Value) -> Self {
        Self {
            module: module.to_string(),
            instance: None,
            config,
        }
    }

    /// Lenient constructor for persisted data. Returns `None` for anything
    /// that is not an object with a string `module` and an object (or
    /// absent) `config`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let module = obj.get("module")?.as_str()?.to_string();
        let instance = obj
            .get("instance")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let config = obj.get("config").cloned().unwrap_or(Value::Null);
        if !(config.is_object() || config.is_null()) {
            return None;
        }
        Some(Self {
            module,
            instance,
            config,
        })
    }

    /// The config as an object. Absent configs count as empty; any other
    /// non-object value marks the side as malformed.
    pub fn config_object(&self) -> Option<Map<String, Value>> {
        match &self.config {
            Value::Object(map) => Some(map.clone()),
            Value::Null => Some(Map::new()),
            _ => None,
        }
    }

    /// Whether this side logically refers to the same binding as `stored`.
    /// Instance ids win when both sides carry one; otherwise module name
    /// plus structural config equality.
    pub fn matches(&self, stored: &InteractionSide) -> bool {
        match (self.instance, stored.instance) {
            (Some(requested), Some(bound)) => requested == bound,
            _ => {
                self.module == stored.module && self.config_object() == stored.config_object()
            }
        }
    }
}

/// A persisted declaration wiring one input module configuration to one
/// output module configuration. One well-formed interaction produces exactly
/// one connection once both sides resolve.
///
/// Both sides are optional so malformed persisted entries survive parsing as
/// skippable values instead of failing the whole load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InteractionSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<InteractionSide>,
}

impl Interaction {
    pub fn new(input: InteractionSide, output: InteractionSide) -> Self {
        Self {
            input: Some(input),
            output: Some(output),
        }
    }

    /// Lenient constructor for persisted data: never fails, maps malformed
    /// entries (null, non-objects, bad sides) to interactions with missing
    /// sides, which every consumer skips.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(obj) => Self {
                input: obj.get("input").and_then(InteractionSide::from_value),
                output: obj.get("output").and_then(InteractionSide::from_value),
            },
            None => Self::default(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }

    /// Whether this interaction logically refers to the same wiring as
    /// `stored`. Malformed interactions match nothing.
    pub fn matches(&self, stored: &Interaction) -> bool {
        match (&self.input, &self.output, &stored.input, &stored.output) {
            (Some(input), Some(output), Some(stored_input), Some(stored_output)) => {
                input.matches(stored_input) && output.matches(stored_output)
            }
            _ => false,
        }
    }
}
