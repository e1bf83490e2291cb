//! Observer configuration.

use std::collections::HashSet;

use cluster_events::ResourceKind;
use kube::runtime::watcher;

/// Components whose events are dropped by default in cluster-events mode.
/// These emit too frequently to be actionable.
const DEFAULT_NOISY_SOURCES: [&str; 3] = ["kubelet", "controllermanager", "default-scheduler"];

/// Which feed the observer subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMode {
    /// Per-object pod/node watches. Every add/update/delete is emitted;
    /// trades precision for completeness, appropriate at low event volume.
    Typed { kinds: Vec<ResourceKind> },
    /// The cluster-level `Event` feed, with repeat suppression and
    /// noisy-source filtering.
    ClusterEvents,
}

/// Configurable options for the observer, assembled by the process entry
/// point and passed in by value.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub mode: WatchMode,

    /// Namespace to watch for namespaced resources; `None` watches all.
    pub namespace: Option<String>,

    /// Source components suppressed entirely in cluster-events mode.
    pub noisy_sources: HashSet<String>,

    /// Server-side watch request timeout in seconds. Each watch is
    /// re-established by the watcher when it elapses.
    pub watch_timeout_secs: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Typed {
                kinds: vec![ResourceKind::Nodes, ResourceKind::Pods],
            },
            namespace: None,
            noisy_sources: DEFAULT_NOISY_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            watch_timeout_secs: 290,
        }
    }
}

impl WatchConfig {
    pub(crate) fn watcher_config(&self) -> watcher::Config {
        watcher::Config::default().timeout(self.watch_timeout_secs)
    }
}
