use async_trait::async_trait;
use ondine_core::{
    Event, FieldDesc, FieldType, ModuleConfig, ModuleKind, ModuleManifest, OutputBehavior,
};
use serde_json::{json, Value};

pub const MODULE_NAME: &str = "Console";

/// Output module that renders routed events through the log facade.
pub struct ConsoleOutput {
    prefix: String,
}

impl ConsoleOutput {
    pub fn new(config: &ModuleConfig) -> Self {
        let prefix = config
            .get("prefix")
            .and_then(Value::as_str)
            .unwrap_or("ondine")
            .to_string();
        Self { prefix }
    }

    pub fn manifest() -> ModuleManifest {
        ModuleManifest::new(
            MODULE_NAME,
            ModuleKind::Output,
            vec![FieldDesc::new("prefix", FieldType::Text, json!("ondine"))],
        )
    }
}

#[async_trait]
impl OutputBehavior for ConsoleOutput {
    async fn on_trigger_event(&self, event: &Event) -> ondine_core::Result<()> {
        log::info!("[{}] trigger: {}", self.prefix, event.payload);
        Ok(())
    }

    async fn on_streaming_event(&self, event: &Event) -> ondine_core::Result<()> {
        // Streamed values are chatty; keep them below info.
        log::debug!("[{}] stream: {}", self.prefix, event.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondine_core::DeliveryMode;

    #[test]
    fn prefix_defaults_and_overrides() {
        assert_eq!(ConsoleOutput::new(&ModuleConfig::new()).prefix, "ondine");

        let mut config = ModuleConfig::new();
        config.insert("prefix".to_string(), json!("stage-left"));
        assert_eq!(ConsoleOutput::new(&config).prefix, "stage-left");
    }

    #[tokio::test]
    async fn handles_both_event_modes() {
        let output = ConsoleOutput::new(&ModuleConfig::new());
        let trigger = Event::new(json!({"tick": 1}), DeliveryMode::Trigger);
        let stream = Event::new(json!({"value": 0.2}), DeliveryMode::Streaming);
        assert!(output.on_trigger_event(&trigger).await.is_ok());
        assert!(output.on_streaming_event(&stream).await.is_ok());
    }
}
