//! Dispatcher loop.
//!
//! Reads the observer's event stream and the sink's inbound messages
//! concurrently, translating each event into a notification. Each source
//! is processed in its own order; no cross-source ordering is promised.

use std::sync::Arc;

use chat_sink::{ChatPlatform, Field, IdentityProvider, Notification, Sink};
use cluster_events::{ClusterEvent, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Translate one event into its notification form.
///
/// Field order is fixed per mode: typed events render Namespace, Message,
/// Node; generic events render Namespace, Name, Kind, Reason, Message,
/// Component.
pub fn notification_for(event: &ClusterEvent) -> Notification {
    let verb = match event.kind {
        EventKind::GenericWarning | EventKind::GenericInfo => {
            return Notification::table(
                event.severity,
                vec![
                    Field::new("Namespace", event.namespace.as_str()),
                    Field::new("Name", event.name.as_str()),
                    Field::new("Kind", event.object_kind.as_str()),
                    Field::new("Reason", event.reason.as_str()),
                    Field::new("Message", event.message.as_str()),
                    Field::new("Component", event.source_component.as_str()),
                ],
            );
        }
        EventKind::NewPod => "Created pod",
        EventKind::UpdatedPod => "Updated pod",
        EventKind::DeletedPod => "Deleted pod",
        EventKind::NewNode => "Created cluster node",
        EventKind::UpdatedNode => "Updated cluster node",
        EventKind::DeletedNode => "Deleted cluster node",
    };

    Notification::table(
        event.severity,
        vec![
            Field::new("Namespace", event.namespace.as_str()),
            Field::new("Message", format!("{verb}: {}", event.object_label())),
            Field::new("Node", event.node_name.as_str()),
        ],
    )
}

/// Drive the pipeline until the input channels close.
pub async fn run<P, I>(
    mut events: mpsc::Receiver<ClusterEvent>,
    mut inbound: mpsc::Receiver<String>,
    sink: Arc<Sink<P, I>>,
) where
    P: ChatPlatform,
    I: IdentityProvider,
{
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    info!(
                        kind = ?event.kind,
                        namespace = %event.namespace,
                        object = %event.object_label(),
                        reason = %event.reason,
                        "cluster event"
                    );
                    if let Err(err) = sink.emit(notification_for(&event)).await {
                        warn!("notification dropped: {err}");
                    }
                }
                None => break,
            },

            message = inbound.recv() => match message {
                Some(text) => info!("received message: {text}"),
                None => break,
            },
        }
    }
    debug!("dispatcher loop stopped");
}

#[cfg(test)]
mod tests {
    use cluster_events::Severity;

    use super::*;

    fn fields(notification: &Notification) -> Vec<(String, String)> {
        match notification {
            Notification::Table { fields, .. } => fields
                .iter()
                .map(|f| (f.label.clone(), f.value.clone()))
                .collect(),
            Notification::Text(_) => panic!("expected a fielded notification"),
        }
    }

    #[test]
    fn test_typed_event_field_order() {
        let mut event = ClusterEvent::new(EventKind::DeletedPod);
        event.severity = Some(Severity::Warning);
        event.namespace = "default".to_string();
        event.generated_name = "web-".to_string();
        event.node_name = "node-1".to_string();

        let notification = notification_for(&event);
        assert_eq!(
            fields(&notification),
            vec![
                ("Namespace".to_string(), "default".to_string()),
                ("Message".to_string(), "Deleted pod: web-".to_string()),
                ("Node".to_string(), "node-1".to_string()),
            ]
        );
        assert!(matches!(
            notification,
            Notification::Table { severity: Some(Severity::Warning), .. }
        ));
    }

    #[test]
    fn test_generic_event_field_order() {
        let mut event = ClusterEvent::new(EventKind::GenericWarning);
        event.namespace = "kube-system".to_string();
        event.name = "web-abc12".to_string();
        event.object_kind = "Pod".to_string();
        event.reason = "BackOff".to_string();
        event.message = "Back-off restarting failed container".to_string();
        event.source_component = "replication-controller".to_string();

        let labels: Vec<String> = fields(&notification_for(&event))
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(
            labels,
            vec!["Namespace", "Name", "Kind", "Reason", "Message", "Component"]
        );
    }

    #[test]
    fn test_unclassified_event_keeps_default_coloring() {
        let event = ClusterEvent::new(EventKind::GenericInfo);
        let notification = notification_for(&event);
        assert!(matches!(
            notification,
            Notification::Table { severity: None, .. }
        ));
    }

    #[test]
    fn test_node_message_verbs() {
        let mut event = ClusterEvent::new(EventKind::NewNode);
        event.name = "node-2".to_string();
        let notification = notification_for(&event);
        let fields = fields(&notification);
        assert_eq!(fields[1].1, "Created cluster node: node-2");
    }
}
