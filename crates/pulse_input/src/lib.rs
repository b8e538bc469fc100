use async_trait::async_trait;
use ondine_core::{
    Emitter, Event, FieldDesc, FieldType, InputBehavior, InputCx, ModuleConfig, ModuleKind,
    ModuleManifest,
};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub const MODULE_NAME: &str = "Pulse Clock";

const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Interval clock input: emits a pulse event every `interval_ms`.
///
/// The tick task is spawned in `on_start` and aborted in `on_stop`; a manual
/// pulse can be fired by routing a trigger event at the instance.
pub struct PulseInput {
    interval: Duration,
    label: String,
    task: Mutex<Option<JoinHandle<()>>>,
    emitter: Mutex<Option<Emitter>>,
}

impl PulseInput {
    pub fn new(config: &ModuleConfig) -> Self {
        let interval_ms = config
            .get("interval_ms")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_INTERVAL_MS);
        let label = config
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("pulse")
            .to_string();
        Self {
            interval: Duration::from_millis(interval_ms),
            label,
            task: Mutex::new(None),
            emitter: Mutex::new(None),
        }
    }

    pub fn manifest() -> ModuleManifest {
        ModuleManifest::new(
            MODULE_NAME,
            ModuleKind::Input,
            vec![
                {
                    let mut field = FieldDesc::new(
                        "interval_ms",
                        FieldType::Number,
                        json!(DEFAULT_INTERVAL_MS),
                    );
                    field.min = Some(10.0);
                    field
                },
                FieldDesc::new("label", FieldType::Text, json!("pulse")),
            ],
        )
    }
}

#[async_trait]
impl InputBehavior for PulseInput {
    async fn on_start(&self, cx: InputCx) -> ondine_core::Result<()> {
        *self.emitter.lock().expect("emitter lock poisoned") = Some(cx.emitter.clone());

        let emitter = cx.emitter;
        let interval = self.interval;
        let label = self.label.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; consume it so the first
            // pulse lands one interval after start.
            ticker.tick().await;
            let mut tick: u64 = 0;
            loop {
                ticker.tick().await;
                tick += 1;
                emitter
                    .emit(json!({
                        "label": label,
                        "tick": tick,
                        "value": started.elapsed().as_millis() as u64,
                    }))
                    .await;
            }
        });

        if let Some(previous) = self
            .task
            .lock()
            .expect("task lock poisoned")
            .replace(handle)
        {
            // Repeat start: the old ticker is superseded.
            previous.abort();
        }
        log::debug!("{}: pulse task started ({:?})", self.label, self.interval);
        Ok(())
    }

    async fn on_stop(&self) -> ondine_core::Result<()> {
        if let Some(task) = self.task.lock().expect("task lock poisoned").take() {
            task.abort();
            log::debug!("{}: pulse task aborted", self.label);
        }
        Ok(())
    }

    async fn on_trigger(&self, _event: &Event) -> ondine_core::Result<()> {
        // Manual fire, e.g. from the configuration UI.
        let emitter = self.emitter.lock().expect("emitter lock poisoned").clone();
        if let Some(emitter) = emitter {
            emitter
                .emit(json!({"label": self.label, "manual": true}))
                .await;
        }
        Ok(())
    }

    async fn on_stream(&self, value: &Value) -> ondine_core::Result<()> {
        log::debug!("{}: ignoring streamed value {value}", self.label);
        Ok(())
    }

    fn on_trigger_parameters(&self) -> ondine_core::Result<Value> {
        Ok(json!({"interval_ms": self.interval.as_millis() as u64}))
    }
}
