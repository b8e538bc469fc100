use anyhow::Context;
use console_output::ConsoleOutput;
use ondine_core::{load_interactions, LogEntry, LogSink, ModuleRegistry, Patchboard};
use pulse_input::PulseInput;
use std::sync::Arc;

/// The registration table for the modules shipped with the daemon. Adding a
/// module kind means adding a line here.
fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_input(
        pulse_input::MODULE_NAME,
        Some(PulseInput::manifest()),
        |config| Box::new(PulseInput::new(config)),
    );
    registry.register_output(
        console_output::MODULE_NAME,
        Some(ConsoleOutput::manifest()),
        |config| Box::new(ConsoleOutput::new(config)),
    );
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = ondine_config::load_daemon_settings()?;

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(filter) = &settings.log_filter {
        builder.parse_filters(filter);
    }
    builder.init();

    let registry = builtin_registry();
    for module in registry.available_modules() {
        log::info!(
            "available {} module: {}",
            module.manifest.kind,
            module.name
        );
    }

    let interactions = load_interactions(&settings.interactions).with_context(|| {
        format!(
            "could not load interactions from {}",
            settings.interactions.display()
        )
    })?;
    log::info!(
        "loaded {} interaction(s) from {}",
        interactions.len(),
        settings.interactions.display()
    );

    // Module log records go to the facade already; the sink is where an
    // orchestration layer would fan records out to connected observers.
    let sink: LogSink = Arc::new(|_entry: &LogEntry| {});

    let mut board = Patchboard::new(sink);
    board.load(&registry, interactions).await;
    log::info!(
        "patchboard up: {} module instance(s), {} connection(s)",
        board.modules().len(),
        board.router().read().await.connections().len()
    );

    board.start_all().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("shutting down");
    board.stop_all().await;

    Ok(())
}
