use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::instance::ModuleInstance;
use crate::{Interaction, InteractionSide};
use ondine_signals::{DeliveryMode, Event, ModuleKind};

/// Router handle shared between the orchestration flow and emitting inputs.
pub type SharedRouter = Arc<RwLock<Router>>;

/// A resolved interaction: the live input/output pair events flow along.
///
/// Derived state only. Connections are rebuilt from the interaction list and
/// the live module set whenever either changes; they are never persisted.
pub struct Connection {
    /// The interaction this connection was resolved from.
    pub interaction: Interaction,
    pub input: Arc<ModuleInstance>,
    pub output: Arc<ModuleInstance>,
}

/// The message router: the live adjacency from input instances to output
/// instances. Holds the connection list and nothing else.
///
/// The router never fails on malformed or unresolvable input. Every such
/// condition degrades to "no connection", which is the correct behavior for
/// a system whose interactions are edited live.
#[derive(Default)]
pub struct Router {
    connections: Vec<Connection>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRouter {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Recompute every connection from scratch.
    ///
    /// Malformed entries and entries whose sides do not resolve are skipped
    /// silently. The new list replaces the old one only after all resolution
    /// work is done, so observers never see a partially-rebuilt state.
    pub fn rebuild(&mut self, interactions: &[Interaction], live: &[Arc<ModuleInstance>]) {
        let mut next = Vec::with_capacity(interactions.len());
        for interaction in interactions {
            if let Some(connection) = resolve(interaction, live) {
                next.push(connection);
            }
        }
        log::debug!(
            "router rebuilt: {} connection(s) from {} interaction(s)",
            next.len(),
            interactions.len()
        );
        self.connections = next;
    }

    /// Resolve and append exactly one connection. A failed resolution is a
    /// no-op; returns whether a connection was added.
    pub fn add_interaction(
        &mut self,
        interaction: &Interaction,
        live: &[Arc<ModuleInstance>],
    ) -> bool {
        match resolve(interaction, live) {
            Some(connection) => {
                log::info!(
                    "router: connected {} -> {}",
                    connection.input.module_name(),
                    connection.output.module_name()
                );
                self.connections.push(connection);
                true
            }
            None => false,
        }
    }

    /// Remove the connection(s) whose logical interaction matches. Removing
    /// a non-existent connection is a no-op; returns how many were dropped.
    pub fn remove_interaction(&mut self, interaction: &Interaction) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|connection| !interaction.matches(&connection.interaction));
        let removed = before - self.connections.len();
        if removed > 0 {
            log::info!("router: removed {removed} connection(s)");
        }
        removed
    }

    /// `remove_interaction(old)` followed by `add_interaction(new)`.
    ///
    /// When the new interaction fails to resolve, the old connection stays
    /// removed and nothing is added; reconciling the persisted list is the
    /// caller's job.
    pub fn update_interaction(
        &mut self,
        old: &Interaction,
        new: &Interaction,
        live: &[Arc<ModuleInstance>],
    ) -> bool {
        self.remove_interaction(old);
        self.add_interaction(new, live)
    }

    /// Deliver an emitted payload to every output connected to `input`,
    /// stamped with `mode`, in connection-list order. An input with no
    /// wired output is valid; the event is silently dropped.
    pub async fn route_event(
        &self,
        input: &Arc<ModuleInstance>,
        payload: Value,
        mode: DeliveryMode,
    ) {
        for connection in self
            .connections
            .iter()
            .filter(|connection| Arc::ptr_eq(&connection.input, input))
        {
            let event = Event::new(payload.clone(), mode);
            connection.output.handle_event(&event).await;
        }
    }

    /// Read-only view for introspection and debugging.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

fn resolve(interaction: &Interaction, live: &[Arc<ModuleInstance>]) -> Option<Connection> {
    let input_side = interaction.input.as_ref()?;
    let output_side = interaction.output.as_ref()?;
    let input = resolve_side(input_side, live, ModuleKind::Input)?;
    let output = resolve_side(output_side, live, ModuleKind::Output)?;
    Some(Connection {
        interaction: interaction.clone(),
        input,
        output,
    })
}

/// Find the live instance an interaction side refers to.
///
/// The persisted instance id is the primary join key. Legacy sides without
/// one fall back to the display name; config equality is required only when
/// several live instances share that name, so two same-type instances with
/// different configs can never swap events.
fn resolve_side(
    side: &InteractionSide,
    live: &[Arc<ModuleInstance>],
    kind: ModuleKind,
) -> Option<Arc<ModuleInstance>> {
    let side_config = side.config_object()?;

    if let Some(id) = side.instance {
        return live
            .iter()
            .find(|module| module.kind() == kind && module.id() == id)
            .cloned();
    }

    let candidates: Vec<&Arc<ModuleInstance>> = live
        .iter()
        .filter(|module| module.kind() == kind && module.module_name() == side.module)
        .collect();
    match candidates.len() {
        0 => None,
        1 => Some(candidates[0].clone()),
        _ => candidates
            .into_iter()
            .find(|module| module.config() == side_config)
            .cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{InputBehavior, OutputBehavior};
    use async_trait::async_trait;
    use ondine_signals::{ModuleConfig, ModuleManifest};
    use serde_json::json;
    use std::sync::Mutex;

    struct NullInput;

    #[async_trait]
    impl InputBehavior for NullInput {
        async fn on_trigger(&self, _event: &Event) -> crate::Result<()> {
            Ok(())
        }

        async fn on_stream(&self, _value: &Value) -> crate::Result<()> {
            Ok(())
        }
    }

    struct RecordingOutput {
        received: Arc<Mutex<Vec<(String, Event)>>>,
        tag: String,
    }

    #[async_trait]
    impl OutputBehavior for RecordingOutput {
        async fn on_trigger_event(&self, event: &Event) -> crate::Result<()> {
            self.received
                .lock()
                .unwrap()
                .push((self.tag.clone(), event.clone()));
            Ok(())
        }

        async fn on_streaming_event(&self, event: &Event) -> crate::Result<()> {
            self.received
                .lock()
                .unwrap()
                .push((self.tag.clone(), event.clone()));
            Ok(())
        }
    }

    fn config_of(value: Value) -> ModuleConfig {
        match value {
            Value::Object(map) => map,
            _ => ModuleConfig::new(),
        }
    }

    fn make_input(name: &str, config: Value) -> Arc<ModuleInstance> {
        ModuleInstance::new_input(
            None,
            Arc::new(ModuleManifest::new(name, ModuleKind::Input, vec![])),
            config_of(config),
            ondine_signals::null_sink(),
            Box::new(NullInput),
        )
    }

    fn make_output(
        name: &str,
        config: Value,
        received: Arc<Mutex<Vec<(String, Event)>>>,
        tag: &str,
    ) -> Arc<ModuleInstance> {
        ModuleInstance::new_output(
            None,
            Arc::new(ModuleManifest::new(name, ModuleKind::Output, vec![])),
            config_of(config),
            ondine_signals::null_sink(),
            Box::new(RecordingOutput {
                received,
                tag: tag.to_string(),
            }),
        )
    }

    fn interaction(input: (&str, Value), output: (&str, Value)) -> Interaction {
        Interaction::new(
            InteractionSide::new(input.0, input.1),
            InteractionSide::new(output.0, output.1),
        )
    }

    #[test]
    fn rebuild_resolves_matching_instances_only() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({"id": 1}));
        let output = make_output("outputA", json!({"id": 1}), received, "a");
        let live = vec![input.clone(), output.clone()];

        let mut router = Router::new();
        router.rebuild(
            &[interaction(
                ("inputA", json!({"id": 1})),
                ("outputA", json!({"id": 1})),
            )],
            &live,
        );
        assert_eq!(router.connections().len(), 1);
        assert!(Arc::ptr_eq(&router.connections()[0].input, &input));
        assert!(Arc::ptr_eq(&router.connections()[0].output, &output));

        // Output side unresolvable: no connection at all.
        router.rebuild(
            &[interaction(
                ("inputA", json!({"id": 1})),
                ("missing", json!({})),
            )],
            &live,
        );
        assert!(router.connections().is_empty());
    }

    #[test]
    fn rebuild_disambiguates_same_name_instances_by_config() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sensor_one = make_input("sensor", json!({"port": 1}));
        let sensor_two = make_input("sensor", json!({"port": 2}));
        let lamp_one = make_output("lamp", json!({"universe": 1}), received.clone(), "one");
        let lamp_two = make_output("lamp", json!({"universe": 2}), received, "two");
        let live = vec![
            sensor_one.clone(),
            sensor_two.clone(),
            lamp_one.clone(),
            lamp_two.clone(),
        ];

        let mut router = Router::new();
        router.rebuild(
            &[
                interaction(
                    ("sensor", json!({"port": 2})),
                    ("lamp", json!({"universe": 2})),
                ),
                interaction(
                    ("sensor", json!({"port": 1})),
                    ("lamp", json!({"universe": 1})),
                ),
            ],
            &live,
        );

        let connections = router.connections();
        assert_eq!(connections.len(), 2);
        assert!(Arc::ptr_eq(&connections[0].input, &sensor_two));
        assert!(Arc::ptr_eq(&connections[0].output, &lamp_two));
        assert!(Arc::ptr_eq(&connections[1].input, &sensor_one));
        assert!(Arc::ptr_eq(&connections[1].output, &lamp_one));
    }

    #[test]
    fn instance_id_is_the_primary_join_key() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sensor_one = make_input("sensor", json!({"port": 1}));
        let sensor_two = make_input("sensor", json!({"port": 1}));
        let lamp = make_output("lamp", json!({}), received, "lamp");
        let live = vec![sensor_one.clone(), sensor_two.clone(), lamp.clone()];

        // Identical name and config on both inputs; only the id picks one.
        let mut side = InteractionSide::new("sensor", json!({"port": 1}));
        side.instance = Some(sensor_two.id());
        let wired = Interaction::new(side, InteractionSide::new("lamp", json!({})));

        let mut router = Router::new();
        router.rebuild(&[wired], &live);
        assert_eq!(router.connections().len(), 1);
        assert!(Arc::ptr_eq(&router.connections()[0].input, &sensor_two));
    }

    #[test]
    fn malformed_interactions_never_panic_and_are_skipped() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({}));
        let output = make_output("outputA", json!({}), received, "a");
        let live = vec![input, output];

        let malformed = vec![
            Interaction::default(),
            Interaction::from_value(&json!(null)),
            Interaction::from_value(&json!({})),
            Interaction::from_value(&json!({"input": {"module": "inputA", "config": 7}})),
            Interaction {
                input: Some(InteractionSide::new("inputA", json!({}))),
                output: None,
            },
            Interaction {
                input: Some(InteractionSide::new("inputA", json!("bad config"))),
                output: Some(InteractionSide::new("outputA", json!({}))),
            },
        ];

        let mut router = Router::new();
        router.rebuild(&malformed, &live);
        assert!(router.connections().is_empty());

        for entry in &malformed {
            assert!(!router.add_interaction(entry, &live));
            router.remove_interaction(entry);
            router.update_interaction(entry, entry, &live);
        }
        assert!(router.connections().is_empty());
    }

    #[tokio::test]
    async fn route_event_delivers_once_with_mode_stamped() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({}));
        let other = make_input("inputB", json!({}));
        let output = make_output("outputA", json!({}), received.clone(), "a");
        let live = vec![input.clone(), other.clone(), output];

        let mut router = Router::new();
        assert!(router.add_interaction(
            &interaction(("inputA", json!({})), ("outputA", json!({}))),
            &live
        ));

        router
            .route_event(&input, json!({"foo": "bar"}), DeliveryMode::Trigger)
            .await;
        // Unconnected input: silent no-op.
        router
            .route_event(&other, json!({"foo": "bar"}), DeliveryMode::Trigger)
            .await;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let (_, event) = &received[0];
        assert_eq!(event.payload, json!({"foo": "bar"}));
        assert_eq!(event.mode, DeliveryMode::Trigger);
    }

    #[tokio::test]
    async fn route_event_follows_connection_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({}));
        let first = make_output("first", json!({}), received.clone(), "first");
        let second = make_output("second", json!({}), received.clone(), "second");
        let live = vec![input.clone(), first, second];

        let mut router = Router::new();
        router.add_interaction(&interaction(("inputA", json!({})), ("first", json!({}))), &live);
        router.add_interaction(
            &interaction(("inputA", json!({})), ("second", json!({}))),
            &live,
        );

        router
            .route_event(&input, json!({"n": 1}), DeliveryMode::Streaming)
            .await;

        let received = received.lock().unwrap();
        let tags: Vec<&str> = received.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(tags, vec!["first", "second"]);
        assert!(received.iter().all(|(_, e)| e.mode == DeliveryMode::Streaming));
    }

    #[test]
    fn removing_a_nonexistent_interaction_is_a_noop() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({}));
        let output = make_output("outputA", json!({}), received, "a");
        let live = vec![input, output];

        let mut router = Router::new();
        router.add_interaction(&interaction(("inputA", json!({})), ("outputA", json!({}))), &live);

        let removed = router.remove_interaction(&interaction(
            ("inputX", json!({})),
            ("outputX", json!({})),
        ));
        assert_eq!(removed, 0);
        assert_eq!(router.connections().len(), 1);
    }

    #[test]
    fn rebuild_keeps_declaration_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input_a = make_input("inputA", json!({"id": 1}));
        let input_b = make_input("inputB", json!({"id": 2}));
        let output_a = make_output("outputA", json!({"id": 1}), received.clone(), "a");
        let output_b = make_output("outputB", json!({"id": 2}), received, "b");
        let live = vec![
            input_a.clone(),
            input_b.clone(),
            output_a.clone(),
            output_b.clone(),
        ];

        let mut router = Router::new();
        router.rebuild(
            &[
                interaction(("inputA", json!({"id": 1})), ("outputA", json!({"id": 1}))),
                interaction(("inputB", json!({"id": 2})), ("outputB", json!({"id": 2}))),
            ],
            &live,
        );

        let connections = router.connections();
        assert_eq!(connections.len(), 2);
        assert!(Arc::ptr_eq(&connections[0].input, &input_a));
        assert!(Arc::ptr_eq(&connections[1].output, &output_b));
    }

    #[test]
    fn update_to_unresolvable_interaction_disconnects() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let input = make_input("inputA", json!({}));
        let output = make_output("outputA", json!({}), received, "a");
        let live = vec![input, output];

        let old = interaction(("inputA", json!({})), ("outputA", json!({})));
        let new = interaction(("inputA", json!({})), ("gone", json!({})));

        let mut router = Router::new();
        router.add_interaction(&old, &live);
        assert_eq!(router.connections().len(), 1);

        // Old connection removed, nothing added: count drops by one.
        assert!(!router.update_interaction(&old, &new, &live));
        assert!(router.connections().is_empty());
    }
}
