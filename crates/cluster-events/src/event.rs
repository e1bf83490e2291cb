//! Event model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification urgency level, also used to select the display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warning,
    Danger,
}

impl Severity {
    /// Attachment color string understood by the delivery channel.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Good => "good",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// A class of cluster object being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pods,
    Nodes,
}

impl ResourceKind {
    /// API plural name of the resource.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Pods => "pods",
            ResourceKind::Nodes => "nodes",
        }
    }
}

/// Kind of detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    NewPod,
    DeletedPod,
    UpdatedPod,
    NewNode,
    DeletedNode,
    UpdatedNode,
    GenericWarning,
    GenericInfo,
}

impl EventKind {
    /// Whether this kind comes from the generic cluster-event feed rather
    /// than a typed pod/node watch.
    pub fn is_generic(&self) -> bool {
        matches!(self, EventKind::GenericWarning | EventKind::GenericInfo)
    }
}

/// One detected cluster change, ready for dispatch.
///
/// `kind` is always set; every other string field may be empty, meaning
/// "not applicable" for the source object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub kind: EventKind,
    /// Resolved urgency; `None` renders with default coloring.
    pub severity: Option<Severity>,
    pub namespace: String,
    pub name: String,
    pub generated_name: String,
    pub node_name: String,
    pub reason: String,
    pub message: String,
    /// Kind of the involved object (e.g. "Pod"), for generic events.
    pub object_kind: String,
    pub source_component: String,
    /// Source timestamp, or observation time if the object carries none.
    pub timestamp: DateTime<Utc>,
}

impl ClusterEvent {
    /// Create an event of the given kind with all other fields empty and
    /// the timestamp set to observation time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            severity: None,
            namespace: String::new(),
            name: String::new(),
            generated_name: String::new(),
            node_name: String::new(),
            reason: String::new(),
            message: String::new(),
            object_kind: String::new(),
            source_component: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Best display label for the object: the name when present, otherwise
    /// the generate-name prefix.
    pub fn object_label(&self) -> &str {
        if self.name.is_empty() {
            &self.generated_name
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_colors() {
        assert_eq!(Severity::Good.color(), "good");
        assert_eq!(Severity::Warning.color(), "warning");
        assert_eq!(Severity::Danger.color(), "danger");
    }

    #[test]
    fn test_resource_kind_names() {
        assert_eq!(ResourceKind::Pods.name(), "pods");
        assert_eq!(ResourceKind::Nodes.name(), "nodes");
    }

    #[test]
    fn test_object_label_prefers_name() {
        let mut ev = ClusterEvent::new(EventKind::NewPod);
        ev.generated_name = "web-".to_string();
        assert_eq!(ev.object_label(), "web-");

        ev.name = "web-abc12".to_string();
        assert_eq!(ev.object_label(), "web-abc12");
    }

    #[test]
    fn test_new_event_defaults_are_empty() {
        let ev = ClusterEvent::new(EventKind::GenericInfo);
        assert!(ev.severity.is_none());
        assert!(ev.namespace.is_empty());
        assert!(ev.kind.is_generic());
    }
}
