use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// DELIVERY MODES & EVENTS
// ============================================================================

/// How an input module delivers events to its connected outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Discrete events ("something happened").
    Trigger,
    /// Continuous values ("the current reading is ...").
    Streaming,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Trigger => write!(f, "trigger"),
            DeliveryMode::Streaming => write!(f, "streaming"),
        }
    }
}

/// An event travelling from an input module to an output module.
///
/// The payload is opaque to the router; the delivery mode is stamped by the
/// router at dispatch time from the emitting input's current mode.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub payload: serde_json::Value,
    pub mode: DeliveryMode,
}

impl Event {
    pub fn new(payload: serde_json::Value, mode: DeliveryMode) -> Self {
        Self { payload, mode }
    }
}

// ============================================================================
// MODULE MANIFESTS
// ============================================================================

/// Capability of a module type: event producer or event consumer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    Input,
    Output,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Input => write!(f, "input"),
            ModuleKind::Output => write!(f, "output"),
        }
    }
}

/// Widget hint for a configurable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Slider,
    Time,
    FilePath,
}

/// One configurable field declared by a module type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDesc {
    /// Config key this field reads and writes.
    pub name: String,
    pub field_type: FieldType,
    /// Default value used when the key is absent from an instance config.
    #[serde(default)]
    pub default: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl FieldDesc {
    pub fn new(name: &str, field_type: FieldType, default: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default,
            min: None,
            max: None,
            step: None,
        }
    }
}

/// Static, type-level description of a module kind.
///
/// Loaded once per registered type and shared between all of its instances.
/// The display name doubles as the legacy cross-reference key for persisted
/// interactions, so it must be stable across releases.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModuleManifest {
    /// Display name, e.g. "Pulse Clock".
    pub name: String,
    pub kind: ModuleKind,
    /// Ordered list of configurable fields for UI consumption.
    #[serde(default)]
    pub fields: Vec<FieldDesc>,
}

impl ModuleManifest {
    pub fn new(name: &str, kind: ModuleKind, fields: Vec<FieldDesc>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            fields,
        }
    }
}

/// Instance-specific configuration: a JSON object owned by one module
/// instance. Replacing it wholesale is a valid operation.
pub type ModuleConfig = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// STRUCTURED LOGGING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One structured log record emitted by a module instance or the loader.
///
/// These travel through the per-instance log sink so the orchestration layer
/// can forward them to observers; library code additionally mirrors them into
/// the `log` facade.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogEntry {
    pub level: LogLevel,
    /// "System" for routine records, "Error" for caught hook failures.
    pub category: String,
    /// Display name of the module the record concerns.
    pub module: String,
    pub message: String,
}

impl LogEntry {
    pub fn system(level: LogLevel, module: &str, message: String) -> Self {
        Self {
            level,
            category: "System".to_string(),
            module: module.to_string(),
            message,
        }
    }

    pub fn error(module: &str, message: String) -> Self {
        Self {
            level: LogLevel::Error,
            category: "Error".to_string(),
            module: module.to_string(),
            message,
        }
    }
}

/// Callback receiving structured log records.
pub type LogSink = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// A sink that drops every record. Useful as a default and in tests that do
/// not assert on logging.
pub fn null_sink() -> LogSink {
    Arc::new(|_| {})
}
