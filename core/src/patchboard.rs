use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::instance::ModuleInstance;
use crate::registry::ModuleRegistry;
use crate::router::{Router, SharedRouter};
use crate::Interaction;
use ondine_signals::{DeliveryMode, LogEntry, LogLevel, LogSink, ModuleConfig, ModuleKind};

/// Owned repository for the live installation state: the persisted
/// interaction list, the live module instances, and the shared router.
///
/// All mutation of the three goes through this type's methods and happens in
/// the single orchestration flow; the raw containers are never handed out.
/// Adding an interaction wires and starts both sides; removing one unwires
/// it and stops and discards the instances nothing else references.
pub struct Patchboard {
    interactions: Vec<Interaction>,
    modules: Vec<Arc<ModuleInstance>>,
    router: SharedRouter,
    log: LogSink,
}

impl Patchboard {
    pub fn new(log: LogSink) -> Self {
        Self {
            interactions: Vec::new(),
            modules: Vec::new(),
            router: Router::shared(),
            log,
        }
    }

    /// Handle for emitters and for introspection. The router itself is only
    /// mutated through this repository.
    pub fn router(&self) -> SharedRouter {
        self.router.clone()
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn modules(&self) -> &[Arc<ModuleInstance>] {
        &self.modules
    }

    pub fn module_by_id(&self, id: Uuid) -> Option<Arc<ModuleInstance>> {
        self.modules.iter().find(|m| m.id() == id).cloned()
    }

    /// Replace the whole state from a freshly loaded interaction list.
    ///
    /// Sides that materialize get their instance id written back into the
    /// owning interaction, which is what makes the id a durable join key on
    /// the next persist. Unresolvable sides stay id-less and simply produce
    /// no connection. Previously live modules are stopped first.
    pub async fn load(&mut self, registry: &ModuleRegistry, interactions: Vec<Interaction>) {
        for module in &self.modules {
            module.stop().await;
        }
        self.modules.clear();
        self.interactions = interactions;

        for interaction in &mut self.interactions {
            if let Some(side) = interaction.input.as_mut() {
                if let Some(instance) = registry.materialize(side, ModuleKind::Input, &self.log) {
                    side.instance = Some(instance.id());
                    self.modules.push(instance);
                }
            }
            if let Some(side) = interaction.output.as_mut() {
                if let Some(instance) = registry.materialize(side, ModuleKind::Output, &self.log) {
                    side.instance = Some(instance.id());
                    self.modules.push(instance);
                }
            }
        }

        self.router
            .write()
            .await
            .rebuild(&self.interactions, &self.modules);
    }

    /// Register one interaction at runtime: all-or-nothing. Either both
    /// sides materialize (and the pair is wired, started, and persisted) or
    /// nothing changes and the rejection is logged loudly.
    pub async fn add_interaction(
        &mut self,
        registry: &ModuleRegistry,
        mut interaction: Interaction,
    ) -> bool {
        let (Some(input_side), Some(output_side)) =
            (interaction.input.as_mut(), interaction.output.as_mut())
        else {
            self.reject("malformed interaction: missing input or output side".to_string());
            return false;
        };

        let Some(input) = registry.materialize(input_side, ModuleKind::Input, &self.log) else {
            self.reject(format!(
                "interaction rejected: input '{}' did not resolve",
                input_side.module
            ));
            return false;
        };
        let Some(output) = registry.materialize(output_side, ModuleKind::Output, &self.log) else {
            self.reject(format!(
                "interaction rejected: output '{}' did not resolve",
                output_side.module
            ));
            return false;
        };

        input_side.instance = Some(input.id());
        output_side.instance = Some(output.id());
        self.modules.push(input.clone());
        self.modules.push(output.clone());
        self.interactions.push(interaction.clone());
        self.router
            .write()
            .await
            .add_interaction(&interaction, &self.modules);

        input.start(&self.router).await;
        output.start(&self.router).await;
        true
    }

    /// Drop the matching interaction(s): connection removed, then the
    /// referenced instances stopped and discarded unless another interaction
    /// still uses them. Removing a non-existent interaction is a no-op.
    pub async fn remove_interaction(&mut self, interaction: &Interaction) {
        self.router.write().await.remove_interaction(interaction);

        let mut removed_ids: Vec<Uuid> = Vec::new();
        self.interactions.retain(|stored| {
            if interaction.matches(stored) {
                removed_ids.extend(side_ids(stored));
                false
            } else {
                true
            }
        });
        if removed_ids.is_empty() {
            return;
        }

        let still_referenced: HashSet<Uuid> =
            self.interactions.iter().flat_map(side_ids).collect();
        let mut discarded = Vec::new();
        self.modules.retain(|module| {
            if removed_ids.contains(&module.id()) && !still_referenced.contains(&module.id()) {
                discarded.push(module.clone());
                false
            } else {
                true
            }
        });
        for module in discarded {
            module.stop().await;
        }
    }

    /// Replace one interaction. Mirrors the router's semantics: when the
    /// replacement fails to resolve, the old wiring is gone and nothing is
    /// added until the next full rebuild. No rollback.
    pub async fn update_interaction(
        &mut self,
        registry: &ModuleRegistry,
        old: &Interaction,
        new: Interaction,
    ) -> bool {
        self.remove_interaction(old).await;
        self.add_interaction(registry, new).await
    }

    pub async fn start_all(&self) {
        for module in &self.modules {
            module.start(&self.router).await;
        }
    }

    pub async fn stop_all(&self) {
        for module in &self.modules {
            module.stop().await;
        }
    }

    /// Replace one module's config under the advisory lock, so observers see
    /// the lock -> mutate -> unlock window.
    pub fn replace_module_config(&self, id: Uuid, config: ModuleConfig) -> bool {
        let Some(module) = self.module_by_id(id) else {
            return false;
        };
        module.lock();
        module.set_config(config);
        module.unlock();
        true
    }

    pub fn set_module_mode(&self, id: Uuid, mode: DeliveryMode) -> bool {
        let Some(module) = self.module_by_id(id) else {
            return false;
        };
        module.set_mode(mode);
        true
    }

    fn reject(&self, message: String) {
        log::error!("{message}");
        (self.log)(&LogEntry {
            level: LogLevel::Error,
            category: "Error".to_string(),
            module: "interactions".to_string(),
            message,
        });
    }
}

fn side_ids(interaction: &Interaction) -> Vec<Uuid> {
    interaction
        .input
        .iter()
        .chain(interaction.output.iter())
        .filter_map(|side| side.instance)
        .collect()
}
