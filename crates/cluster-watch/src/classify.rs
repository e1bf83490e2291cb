//! Change classification.
//!
//! Pure mapping from raw watch records to [`ClusterEvent`] values. The
//! typed pod/node mapping emits everything; the cluster-events mapping
//! applies the repeat-suppression and noisy-source rules before assigning
//! severity.

use std::collections::HashSet;

use chrono::Utc;
use cluster_events::{ClusterEvent, EventKind, Severity};
use k8s_openapi::api::core::v1::{Event as CoreEvent, Node, Pod};

/// Crash-loop records carry this reason.
const BACKOFF_REASON: &str = "BackOff";

/// Repeat count at which a crash loop becomes worth a notification.
const BACKOFF_NOTIFY_COUNT: i32 = 3;

/// How a watched object changed, as seen by the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// Map a pod change to an event. No suppression in typed mode.
pub fn classify_pod(change: ChangeType, pod: &Pod) -> ClusterEvent {
    let (kind, severity) = match change {
        ChangeType::Added => (EventKind::NewPod, Severity::Good),
        ChangeType::Modified => (EventKind::UpdatedPod, Severity::Warning),
        ChangeType::Deleted => (EventKind::DeletedPod, Severity::Warning),
    };

    let mut ev = ClusterEvent::new(kind);
    ev.severity = Some(severity);
    ev.namespace = pod.metadata.namespace.clone().unwrap_or_default();
    ev.name = pod.metadata.name.clone().unwrap_or_default();
    ev.generated_name = pod.metadata.generate_name.clone().unwrap_or_default();
    ev.node_name = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.clone())
        .unwrap_or_default();
    ev.object_kind = "Pod".to_string();
    ev
}

/// Map a node change to an event. No suppression in typed mode.
pub fn classify_node(change: ChangeType, node: &Node) -> ClusterEvent {
    let (kind, severity) = match change {
        ChangeType::Added => (EventKind::NewNode, Severity::Good),
        ChangeType::Modified => (EventKind::UpdatedNode, Severity::Warning),
        ChangeType::Deleted => (EventKind::DeletedNode, Severity::Danger),
    };

    let mut ev = ClusterEvent::new(kind);
    ev.severity = Some(severity);
    ev.name = node.metadata.name.clone().unwrap_or_default();
    ev.generated_name = node.metadata.generate_name.clone().unwrap_or_default();
    ev.node_name = ev.name.clone();
    ev.object_kind = "Node".to_string();
    ev
}

/// Classify a record from the cluster-level event feed.
///
/// Returns `None` when the record is suppressed: its source component is
/// in the noisy set, or it is a repeat (`count > 1`) that is not the
/// crash-loop promotion case.
///
/// Severity rules are evaluated in priority order, first match wins:
/// BackOff at the notify count, change added, change deleted, then the
/// per-reason table.
pub fn classify_cluster_event(
    record: &CoreEvent,
    change: ChangeType,
    noisy_sources: &HashSet<String>,
) -> Option<ClusterEvent> {
    let source = record.source.as_ref();
    let component = source
        .and_then(|s| s.component.clone())
        .unwrap_or_default();
    if noisy_sources.contains(&component) {
        return None;
    }

    let reason = record.reason.clone().unwrap_or_default();
    let count = record.count.unwrap_or(0);
    let crash_loop = reason == BACKOFF_REASON && count == BACKOFF_NOTIFY_COUNT;
    if count > 1 && !crash_loop {
        return None;
    }

    let severity = if crash_loop {
        Some(Severity::Danger)
    } else {
        match change {
            ChangeType::Added => Some(Severity::Good),
            ChangeType::Deleted => Some(Severity::Warning),
            ChangeType::Modified => match reason.as_str() {
                "SuccessfulCreate" => Some(Severity::Good),
                "NodeReady" => Some(Severity::Good),
                "NodeNotReady" => Some(Severity::Danger),
                "NodeOutOfDisk" => Some(Severity::Danger),
                _ => None,
            },
        }
    };

    let kind = if record.type_.as_deref() == Some("Warning") {
        EventKind::GenericWarning
    } else {
        EventKind::GenericInfo
    };

    let mut ev = ClusterEvent::new(kind);
    ev.severity = severity;
    ev.namespace = record
        .involved_object
        .namespace
        .clone()
        .or_else(|| record.metadata.namespace.clone())
        .unwrap_or_default();
    ev.name = record
        .involved_object
        .name
        .clone()
        .or_else(|| record.metadata.name.clone())
        .unwrap_or_default();
    ev.generated_name = record.metadata.generate_name.clone().unwrap_or_default();
    ev.node_name = source.and_then(|s| s.host.clone()).unwrap_or_default();
    ev.reason = reason;
    ev.message = record.message.clone().unwrap_or_default();
    ev.object_kind = record.involved_object.kind.clone().unwrap_or_default();
    ev.source_component = component;
    ev.timestamp = record
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| record.event_time.as_ref().map(|t| t.0))
        .unwrap_or_else(Utc::now);
    Some(ev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::EventSource;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn record(reason: &str, count: i32) -> CoreEvent {
        CoreEvent {
            reason: Some(reason.to_string()),
            count: Some(count),
            ..Default::default()
        }
    }

    fn no_noise() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_repeat_records_are_suppressed() {
        let ev = classify_cluster_event(&record("Pulled", 2), ChangeType::Modified, &no_noise());
        assert!(ev.is_none());
    }

    #[test]
    fn test_backoff_third_repeat_promoted_to_danger() {
        let ev = classify_cluster_event(&record("BackOff", 3), ChangeType::Modified, &no_noise())
            .expect("crash loop record must be emitted");
        assert_eq!(ev.severity, Some(Severity::Danger));

        // Any other repeat count of the same reason stays suppressed.
        assert!(
            classify_cluster_event(&record("BackOff", 2), ChangeType::Modified, &no_noise())
                .is_none()
        );
        assert!(
            classify_cluster_event(&record("BackOff", 4), ChangeType::Modified, &no_noise())
                .is_none()
        );
    }

    #[test]
    fn test_noisy_source_suppressed_regardless_of_reason() {
        let noisy: HashSet<String> = ["kubelet".to_string()].into_iter().collect();
        let mut rec = record("BackOff", 3);
        rec.source = Some(EventSource {
            component: Some("kubelet".to_string()),
            host: Some("node-1".to_string()),
        });
        assert!(classify_cluster_event(&rec, ChangeType::Modified, &noisy).is_none());
        assert!(classify_cluster_event(&rec, ChangeType::Added, &noisy).is_none());
    }

    #[test]
    fn test_added_wins_over_reason_rules() {
        let ev = classify_cluster_event(
            &record("SuccessfulCreate", 1),
            ChangeType::Added,
            &no_noise(),
        )
        .expect("added record must be emitted");
        assert_eq!(ev.severity, Some(Severity::Good));
    }

    #[test]
    fn test_deleted_wins_over_node_ready() {
        // Pins the priority order: the change-type rule resolves before the
        // per-reason table, so a deleted NodeReady record is Warning.
        let ev = classify_cluster_event(&record("NodeReady", 1), ChangeType::Deleted, &no_noise())
            .expect("deleted record must be emitted");
        assert_eq!(ev.severity, Some(Severity::Warning));
    }

    #[test]
    fn test_reason_table_for_modified_records() {
        let cases = [
            ("SuccessfulCreate", Some(Severity::Good)),
            ("NodeReady", Some(Severity::Good)),
            ("NodeNotReady", Some(Severity::Danger)),
            ("NodeOutOfDisk", Some(Severity::Danger)),
            ("Scheduled", None),
        ];
        for (reason, expected) in cases {
            let ev = classify_cluster_event(&record(reason, 1), ChangeType::Modified, &no_noise())
                .expect("record must be emitted");
            assert_eq!(ev.severity, expected, "reason {reason}");
        }
    }

    #[test]
    fn test_warning_type_maps_to_generic_warning() {
        let mut rec = record("FailedScheduling", 1);
        rec.type_ = Some("Warning".to_string());
        let ev = classify_cluster_event(&rec, ChangeType::Modified, &no_noise()).unwrap();
        assert_eq!(ev.kind, EventKind::GenericWarning);

        rec.type_ = Some("Normal".to_string());
        let ev = classify_cluster_event(&rec, ChangeType::Modified, &no_noise()).unwrap();
        assert_eq!(ev.kind, EventKind::GenericInfo);
    }

    #[test]
    fn test_timestamp_defaults_to_observation_time() {
        let before = Utc::now();
        let ev =
            classify_cluster_event(&record("Started", 1), ChangeType::Modified, &no_noise())
                .unwrap();
        assert!(ev.timestamp >= before);

        let stamped = Time(before - chrono::Duration::minutes(5));
        let mut rec = record("Started", 1);
        rec.last_timestamp = Some(stamped.clone());
        let ev = classify_cluster_event(&rec, ChangeType::Modified, &no_noise()).unwrap();
        assert_eq!(ev.timestamp, stamped.0);
    }

    #[test]
    fn test_typed_pod_severity_table() {
        let pod = Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("web-abc12".to_string()),
                namespace: Some("default".to_string()),
                generate_name: Some("web-".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let ev = classify_pod(ChangeType::Added, &pod);
        assert_eq!(ev.kind, EventKind::NewPod);
        assert_eq!(ev.severity, Some(Severity::Good));
        assert_eq!(ev.namespace, "default");

        let ev = classify_pod(ChangeType::Deleted, &pod);
        assert_eq!(ev.kind, EventKind::DeletedPod);
        assert_eq!(ev.severity, Some(Severity::Warning));

        let ev = classify_pod(ChangeType::Modified, &pod);
        assert_eq!(ev.kind, EventKind::UpdatedPod);
        assert_eq!(ev.severity, Some(Severity::Warning));
    }

    #[test]
    fn test_typed_node_severity_table() {
        let node = Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let ev = classify_node(ChangeType::Added, &node);
        assert_eq!(ev.kind, EventKind::NewNode);
        assert_eq!(ev.severity, Some(Severity::Good));
        assert_eq!(ev.node_name, "node-1");

        let ev = classify_node(ChangeType::Deleted, &node);
        assert_eq!(ev.kind, EventKind::DeletedNode);
        assert_eq!(ev.severity, Some(Severity::Danger));

        let ev = classify_node(ChangeType::Modified, &node);
        assert_eq!(ev.kind, EventKind::UpdatedNode);
        assert_eq!(ev.severity, Some(Severity::Warning));
    }
}
