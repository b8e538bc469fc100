use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::router::{Router, SharedRouter};
use ondine_signals::{
    DeliveryMode, Event, LogEntry, LogLevel, LogSink, ModuleConfig, ModuleKind, ModuleManifest,
};

/// Start context handed to an input module's `on_start` hook.
pub struct InputCx {
    /// Handle for emitting events into the router. Cheap to clone; safe to
    /// move into spawned tasks (holds only weak references).
    pub emitter: Emitter,
    /// Snapshot of the instance configuration at start time.
    pub config: ModuleConfig,
    pub log: LogSink,
}

/// Start context handed to an output module's `on_start` hook.
pub struct OutputCx {
    pub config: ModuleConfig,
    pub log: LogSink,
}

/// Hook surface implemented by concrete input modules (event producers).
///
/// Hooks return `Result` so failures stay explicit, but nothing propagates
/// past the instance wrapper: every error is caught there, logged with
/// category "Error", and swallowed. Hooks take `&self`; modules that need
/// mutable state use their own interior mutability.
#[async_trait]
pub trait InputBehavior: Send + Sync {
    async fn on_start(&self, cx: InputCx) -> crate::Result<()> {
        let _ = cx;
        Ok(())
    }

    async fn on_stop(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Invoked by `handle_event` while the instance is in trigger mode.
    async fn on_trigger(&self, event: &Event) -> crate::Result<()>;

    /// Invoked by `handle_event` while the instance is in streaming mode,
    /// with the event payload as the streamed value.
    async fn on_stream(&self, value: &Value) -> crate::Result<()>;

    /// Type-specific snapshot of the parameters relevant to triggering.
    fn on_trigger_parameters(&self) -> crate::Result<Value> {
        Ok(Value::Null)
    }
}

/// Hook surface implemented by concrete output modules (event consumers).
#[async_trait]
pub trait OutputBehavior: Send + Sync {
    async fn on_start(&self, cx: OutputCx) -> crate::Result<()> {
        let _ = cx;
        Ok(())
    }

    async fn on_stop(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Invoked for events stamped with trigger mode.
    async fn on_trigger_event(&self, event: &Event) -> crate::Result<()>;

    /// Invoked for events stamped with streaming mode.
    async fn on_streaming_event(&self, event: &Event) -> crate::Result<()>;
}

enum Behavior {
    Input(Box<dyn InputBehavior>),
    Output(Box<dyn OutputBehavior>),
}

/// A running module: the uniform contract every module satisfies regardless
/// of kind.
///
/// Instances are shared as `Arc<ModuleInstance>` between the live-module
/// list and router connections; reference identity (`Arc::ptr_eq`) is what
/// `route_event` matches on. The instance owns its configuration, carries a
/// non-owning reference to its type manifest, and wraps every behavior hook
/// in a catch-log-continue guard, so `start`, `stop` and `handle_event`
/// never fail at this boundary.
pub struct ModuleInstance {
    id: Uuid,
    manifest: Arc<ModuleManifest>,
    config: Mutex<ModuleConfig>,
    locked: AtomicBool,
    mode: Mutex<DeliveryMode>,
    log: LogSink,
    behavior: Behavior,
    /// Self-reference handed to emitters, so `route_event` can match on
    /// reference identity without the caller threading the `Arc` through.
    weak: Weak<ModuleInstance>,
}

impl ModuleInstance {
    pub fn new_input(
        id: Option<Uuid>,
        manifest: Arc<ModuleManifest>,
        config: ModuleConfig,
        log: LogSink,
        behavior: Box<dyn InputBehavior>,
    ) -> Arc<Self> {
        Self::new(id, manifest, config, log, Behavior::Input(behavior))
    }

    pub fn new_output(
        id: Option<Uuid>,
        manifest: Arc<ModuleManifest>,
        config: ModuleConfig,
        log: LogSink,
        behavior: Box<dyn OutputBehavior>,
    ) -> Arc<Self> {
        Self::new(id, manifest, config, log, Behavior::Output(behavior))
    }

    fn new(
        id: Option<Uuid>,
        manifest: Arc<ModuleManifest>,
        config: ModuleConfig,
        log: LogSink,
        behavior: Behavior,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id: id.unwrap_or_else(Uuid::new_v4),
            manifest,
            config: Mutex::new(config),
            locked: AtomicBool::new(false),
            mode: Mutex::new(DeliveryMode::Trigger),
            log,
            behavior,
            weak: weak.clone(),
        })
    }

    /// Stable instance identifier, assigned at creation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Manifest display name. Also the legacy cross-reference key for
    /// persisted interactions, so not necessarily unique across instances.
    pub fn module_name(&self) -> &str {
        &self.manifest.name
    }

    pub fn manifest(&self) -> &Arc<ModuleManifest> {
        &self.manifest
    }

    pub fn kind(&self) -> ModuleKind {
        match &self.behavior {
            Behavior::Input(_) => ModuleKind::Input,
            Behavior::Output(_) => ModuleKind::Output,
        }
    }

    pub fn config(&self) -> ModuleConfig {
        self.config.lock().expect("config lock poisoned").clone()
    }

    /// Replace the configuration wholesale.
    pub fn set_config(&self, new_config: ModuleConfig) {
        *self.config.lock().expect("config lock poisoned") = new_config;
        self.record(
            LogLevel::Info,
            "System",
            format!("{}: configuration replaced", self.module_name()),
        );
    }

    /// Advisory flag marking the instance as mid-mutation. Observable status
    /// for API consumers, not a memory-protection primitive.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
        self.record(
            LogLevel::Info,
            "System",
            format!("{}: locked for update", self.module_name()),
        );
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
        self.record(
            LogLevel::Info,
            "System",
            format!("{}: unlocked", self.module_name()),
        );
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> DeliveryMode {
        *self.mode.lock().expect("mode lock poisoned")
    }

    /// Switch between trigger and streaming delivery.
    pub fn set_mode(&self, mode: DeliveryMode) {
        *self.mode.lock().expect("mode lock poisoned") = mode;
        self.record(
            LogLevel::Info,
            "System",
            format!("{}: delivery mode set to {mode}", self.module_name()),
        );
    }

    /// Start the instance. Hook failures are logged and swallowed; from the
    /// caller's perspective this always completes.
    pub async fn start(&self, router: &SharedRouter) {
        match &self.behavior {
            Behavior::Input(behavior) => {
                let cx = InputCx {
                    emitter: Emitter {
                        instance: self.weak.clone(),
                        router: Arc::downgrade(router),
                    },
                    config: self.config(),
                    log: self.log.clone(),
                };
                self.guard("on_start", behavior.on_start(cx)).await;
            }
            Behavior::Output(behavior) => {
                let cx = OutputCx {
                    config: self.config(),
                    log: self.log.clone(),
                };
                self.guard("on_start", behavior.on_start(cx)).await;
            }
        }
    }

    /// Stop the instance. Best-effort, like `start`.
    pub async fn stop(&self) {
        match &self.behavior {
            Behavior::Input(behavior) => self.guard("on_stop", behavior.on_stop()).await,
            Behavior::Output(behavior) => self.guard("on_stop", behavior.on_stop()).await,
        }
    }

    /// Dispatch an event to the concrete hooks.
    ///
    /// Inputs dispatch on their own current mode (`on_trigger`/`on_stream`);
    /// outputs dispatch on the mode stamped into the event
    /// (`on_trigger_event`/`on_streaming_event`).
    pub async fn handle_event(&self, event: &Event) {
        match &self.behavior {
            Behavior::Input(behavior) => match self.mode() {
                DeliveryMode::Trigger => {
                    self.guard("on_trigger", behavior.on_trigger(event)).await;
                }
                DeliveryMode::Streaming => {
                    self.guard("on_stream", behavior.on_stream(&event.payload))
                        .await;
                }
            },
            Behavior::Output(behavior) => match event.mode {
                DeliveryMode::Trigger => {
                    self.guard("on_trigger_event", behavior.on_trigger_event(event))
                        .await;
                }
                DeliveryMode::Streaming => {
                    self.guard("on_streaming_event", behavior.on_streaming_event(event))
                        .await;
                }
            },
        }
    }

    /// Snapshot of the input's trigger-relevant parameters, `None` for
    /// outputs and on hook failure.
    pub fn trigger_parameters(&self) -> Option<Value> {
        match &self.behavior {
            Behavior::Input(behavior) => match behavior.on_trigger_parameters() {
                Ok(value) => Some(value),
                Err(err) => {
                    self.record(
                        LogLevel::Error,
                        "Error",
                        format!(
                            "{}: on_trigger_parameters failed: {err:#}",
                            self.module_name()
                        ),
                    );
                    None
                }
            },
            Behavior::Output(_) => None,
        }
    }

    /// Hand an event to the router together with this instance and its
    /// current delivery mode. Returns once every matched output has been
    /// invoked.
    pub async fn emit_event(&self, router: &SharedRouter, payload: Value) {
        let mode = self.mode();
        let Some(this) = self.weak.upgrade() else {
            return;
        };
        router.read().await.route_event(&this, payload, mode).await;
    }

    /// Run a hook future under the catch-log-continue policy.
    async fn guard<F>(&self, hook: &str, fut: F)
    where
        F: Future<Output = crate::Result<()>>,
    {
        if let Err(err) = fut.await {
            self.record(
                LogLevel::Error,
                "Error",
                format!("{}: {hook} failed: {err:#}", self.module_name()),
            );
        }
    }

    fn record(&self, level: LogLevel, category: &str, message: String) {
        match level {
            LogLevel::Debug => log::debug!("{message}"),
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warning => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
        let entry = LogEntry {
            level,
            category: category.to_string(),
            module: self.module_name().to_string(),
            message,
        };
        (self.log)(&entry);
    }
}

/// Emitting handle handed to input behaviors at start.
///
/// Holds only weak references, so a stopped-and-discarded instance (or a
/// torn-down router) turns emission into a silent no-op instead of keeping
/// the object graph alive.
#[derive(Clone)]
pub struct Emitter {
    instance: Weak<ModuleInstance>,
    router: Weak<RwLock<Router>>,
}

impl Emitter {
    pub async fn emit(&self, payload: Value) {
        let (Some(instance), Some(router)) = (self.instance.upgrade(), self.router.upgrade())
        else {
            return;
        };
        instance.emit_event(&router, payload).await;
    }
}
