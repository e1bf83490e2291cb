//! Notification payloads.

use cluster_events::Severity;

/// One labeled value in a fielded notification. Display order matters to
/// the end user, so fields travel as an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A message ready for display, either plain text or a leveled table of
/// fields. The delivery channel matches exhaustively over the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text(String),
    Table {
        severity: Option<Severity>,
        fields: Vec<Field>,
    },
}

impl Notification {
    /// Create a plain-text notification.
    pub fn text(text: impl Into<String>) -> Self {
        Notification::Text(text.into())
    }

    /// Create a fielded notification with the given urgency.
    pub fn table(severity: Option<Severity>, fields: Vec<Field>) -> Self {
        Notification::Table { severity, fields }
    }

    /// Plain-text rendering for clients without rich display, preserving
    /// field order.
    pub fn fallback(&self) -> String {
        match self {
            Notification::Text(text) => text.clone(),
            Notification::Table { fields, .. } => fields
                .iter()
                .map(|f| format!("{}: {}", f.label, f.value))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
