use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::instance::{InputBehavior, ModuleInstance, OutputBehavior};
use crate::{Interaction, InteractionSide};
use ondine_signals::{LogEntry, LogLevel, LogSink, ModuleConfig, ModuleKind, ModuleManifest};

pub type InputFactory = Box<dyn Fn(&ModuleConfig) -> Box<dyn InputBehavior> + Send + Sync>;
pub type OutputFactory = Box<dyn Fn(&ModuleConfig) -> Box<dyn OutputBehavior> + Send + Sync>;

/// Constructor for one registered module type.
pub enum ModuleFactory {
    Input(InputFactory),
    Output(OutputFactory),
}

/// One registered module type: its manifest (when declared) and factory.
pub struct ModuleEntry {
    manifest: Option<Arc<ModuleManifest>>,
    factory: ModuleFactory,
}

impl ModuleEntry {
    pub fn kind(&self) -> ModuleKind {
        match &self.factory {
            ModuleFactory::Input(_) => ModuleKind::Input,
            ModuleFactory::Output(_) => ModuleKind::Output,
        }
    }

    pub fn manifest(&self) -> Option<&Arc<ModuleManifest>> {
        self.manifest.as_ref()
    }
}

/// Registry row exposed for UI consumption.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableModule {
    pub name: String,
    pub manifest: ModuleManifest,
}

/// Maps module type names to factories and manifests, and materializes
/// concrete instances from persisted interaction lists.
///
/// The table is populated explicitly in code by whoever assembles the
/// application; there is no directory scanning. Lookup of an unknown type
/// yields `None`, never an error, and enumeration never fails.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, ModuleEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_input<F>(&mut self, name: &str, manifest: Option<ModuleManifest>, factory: F)
    where
        F: Fn(&ModuleConfig) -> Box<dyn InputBehavior> + Send + Sync + 'static,
    {
        log::debug!("registry: registered input module '{name}'");
        self.entries.insert(
            name.to_string(),
            ModuleEntry {
                manifest: manifest.map(Arc::new),
                factory: ModuleFactory::Input(Box::new(factory)),
            },
        );
    }

    pub fn register_output<F>(&mut self, name: &str, manifest: Option<ModuleManifest>, factory: F)
    where
        F: Fn(&ModuleConfig) -> Box<dyn OutputBehavior> + Send + Sync + 'static,
    {
        log::debug!("registry: registered output module '{name}'");
        self.entries.insert(
            name.to_string(),
            ModuleEntry {
                manifest: manifest.map(Arc::new),
                factory: ModuleFactory::Output(Box::new(factory)),
            },
        );
    }

    /// Look up a registered type. Unknown names are `None`.
    pub fn entry(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.get(name)
    }

    /// Every registered type with its manifest, sorted by name. Types
    /// registered without a manifest report an empty one; enumeration never
    /// fails because a single entry is incomplete.
    pub fn available_modules(&self) -> Vec<AvailableModule> {
        let mut modules: Vec<AvailableModule> = self
            .entries
            .iter()
            .map(|(name, entry)| AvailableModule {
                name: name.clone(),
                manifest: entry
                    .manifest
                    .as_ref()
                    .map(|m| (**m).clone())
                    .unwrap_or_default(),
            })
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    /// Materialize module instances from a persisted interaction list.
    ///
    /// Each interaction's sides are resolved independently; an unknown type
    /// name skips that side with a warning and the load continues. Resolved
    /// instances are returned flat, in declaration order, input before
    /// output within each interaction.
    pub fn instantiate(
        &self,
        interactions: &[Interaction],
        log: &LogSink,
    ) -> Vec<Arc<ModuleInstance>> {
        let mut modules = Vec::new();
        for interaction in interactions {
            if let Some(side) = &interaction.input {
                if let Some(instance) = self.materialize(side, ModuleKind::Input, log) {
                    modules.push(instance);
                }
            }
            if let Some(side) = &interaction.output {
                if let Some(instance) = self.materialize(side, ModuleKind::Output, log) {
                    modules.push(instance);
                }
            }
        }
        modules
    }

    /// Read the persisted interaction list at `path` and materialize every
    /// resolvable side. Wholesale parse failures propagate; per-entry
    /// problems degrade per `instantiate`.
    pub fn load_modules_from_config(
        &self,
        path: &Path,
        log: &LogSink,
    ) -> Result<Vec<Arc<ModuleInstance>>, LoadError> {
        let interactions = load_interactions(path)?;
        Ok(self.instantiate(&interactions, log))
    }

    /// Instantiate one interaction side, or `None` (with a warning) when the
    /// type name is unknown or registered under the other capability.
    pub fn materialize(
        &self,
        side: &InteractionSide,
        expected: ModuleKind,
        log: &LogSink,
    ) -> Option<Arc<ModuleInstance>> {
        let Some(entry) = self.entries.get(&side.module) else {
            warn(log, &side.module, format!("Unknown {expected} module: {}", side.module));
            return None;
        };
        if entry.kind() != expected {
            warn(
                log,
                &side.module,
                format!("Module '{}' is not an {expected} module", side.module),
            );
            return None;
        }

        let config = side.config_object().unwrap_or_default();
        let manifest = entry.manifest.clone().unwrap_or_else(|| {
            // Manifest-less registration: synthesize one carrying the
            // registered type name so the legacy join key stays meaningful.
            Arc::new(ModuleManifest::new(&side.module, expected, vec![]))
        });
        let instance = match &entry.factory {
            ModuleFactory::Input(factory) => ModuleInstance::new_input(
                side.instance,
                manifest,
                config.clone(),
                log.clone(),
                factory(&config),
            ),
            ModuleFactory::Output(factory) => ModuleInstance::new_output(
                side.instance,
                manifest,
                config.clone(),
                log.clone(),
                factory(&config),
            ),
        };
        Some(instance)
    }
}

fn warn(log: &LogSink, module: &str, message: String) {
    log::warn!("{message}");
    (log)(&LogEntry {
        level: LogLevel::Warning,
        category: "System".to_string(),
        module: module.to_string(),
        message,
    });
}

/// On-disk shape of the persisted interaction list.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InteractionFile {
    #[serde(default)]
    pub interactions: Vec<serde_json::Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read interaction file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid interaction file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read and parse the persisted interaction list.
///
/// A file that cannot be read or parsed fails the whole load; nothing is
/// partially loaded. Individual malformed entries, by contrast, survive as
/// skippable interactions so one bad entry never aborts the rest.
pub fn load_interactions(path: &Path) -> Result<Vec<Interaction>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: InteractionFile =
        serde_json::from_str(&text).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file
        .interactions
        .iter()
        .map(Interaction::from_value)
        .collect())
}
