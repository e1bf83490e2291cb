//! Watch task management.
//!
//! One task per watched kind, all feeding a single merged event channel.
//! Restart and backoff for interrupted watches belong to the underlying
//! `kube` watcher; tasks here only classify, forward, and escalate
//! credential failures.

use std::collections::HashSet;
use std::fmt::Debug;
use std::pin::pin;

use cluster_events::{ClusterEvent, ResourceKind};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Event as CoreEvent, Node, Pod};
use kube::api::Api;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{ChangeType, classify_cluster_event, classify_node, classify_pod};
use crate::config::{WatchConfig, WatchMode};
use crate::error::WatchError;

/// Capacity of the merged event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Observes the cluster feed and emits classified events.
pub struct Observer {
    client: Client,
    config: WatchConfig,
}

/// Result of starting an observer.
pub struct ObserverHandle {
    /// Merged, classified event stream. Closes when every watch task has
    /// stopped.
    pub events: mpsc::Receiver<ClusterEvent>,
    /// Side channel for unrecoverable errors. The caller decides whether
    /// to restart or terminate.
    pub errors: mpsc::Receiver<WatchError>,
    /// Watch task handles, joinable after shutdown is requested.
    pub tasks: Vec<JoinHandle<()>>,
}

impl Observer {
    pub fn new(client: Client, config: WatchConfig) -> Self {
        Self { client, config }
    }

    /// Establish one watch per configured kind and return the merged
    /// output. Cancelling `shutdown` tears the watches down and closes the
    /// event channel.
    pub fn start(&self, shutdown: CancellationToken) -> ObserverHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(4);
        let wcfg = self.config.watcher_config();

        let mut tasks = Vec::new();
        match &self.config.mode {
            WatchMode::Typed { kinds } => {
                for kind in kinds {
                    let task = match kind {
                        ResourceKind::Pods => spawn_watch(
                            self.namespaced_api::<Pod>(),
                            wcfg.clone(),
                            shutdown.clone(),
                            events_tx.clone(),
                            errors_tx.clone(),
                            "pods",
                            |change, pod: &Pod| Some(classify_pod(change, pod)),
                        ),
                        ResourceKind::Nodes => spawn_watch(
                            Api::<Node>::all(self.client.clone()),
                            wcfg.clone(),
                            shutdown.clone(),
                            events_tx.clone(),
                            errors_tx.clone(),
                            "nodes",
                            |change, node: &Node| Some(classify_node(change, node)),
                        ),
                    };
                    tasks.push(task);
                }
            }
            WatchMode::ClusterEvents => {
                let noisy = self.config.noisy_sources.clone();
                tasks.push(spawn_watch(
                    self.namespaced_api::<CoreEvent>(),
                    wcfg,
                    shutdown,
                    events_tx,
                    errors_tx,
                    "events",
                    move |change, record: &CoreEvent| {
                        classify_cluster_event(record, change, &noisy)
                    },
                ));
            }
        }

        info!("observer started with {} watch task(s)", tasks.len());
        ObserverHandle {
            events: events_rx,
            errors: errors_rx,
            tasks,
        }
    }

    fn namespaced_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Watch one resource kind, classify its changes, and forward survivors.
///
/// The watch protocol folds adds and updates into a single apply signal,
/// so first sight of a UID (including the initial list) counts as an add
/// and later applies count as updates. Records without a UID are malformed
/// and skipped.
fn spawn_watch<K, F>(
    api: Api<K>,
    wcfg: watcher::Config,
    shutdown: CancellationToken,
    events_tx: mpsc::Sender<ClusterEvent>,
    errors_tx: mpsc::Sender<WatchError>,
    label: &'static str,
    classify: F,
) -> JoinHandle<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    F: Fn(ChangeType, &K) -> Option<ClusterEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = pin!(watcher(api, wcfg).default_backoff());
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                item = stream.next() => match item {
                    Some(Ok(change)) => {
                        let (change_type, obj) = match change {
                            watcher::Event::Init | watcher::Event::InitDone => continue,
                            watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
                                let Some(uid) = obj.uid() else {
                                    warn!("skipping malformed {label} record without uid");
                                    continue;
                                };
                                let change_type = if seen.insert(uid) {
                                    ChangeType::Added
                                } else {
                                    ChangeType::Modified
                                };
                                (change_type, obj)
                            }
                            watcher::Event::Delete(obj) => {
                                let Some(uid) = obj.uid() else {
                                    warn!("skipping malformed {label} record without uid");
                                    continue;
                                };
                                seen.remove(&uid);
                                (ChangeType::Deleted, obj)
                            }
                        };

                        if let Some(ev) = classify(change_type, &obj) {
                            if events_tx.send(ev).await.is_err() {
                                // Consumer is gone, nothing left to do.
                                return;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        if let Some(detail) = auth_failure(&err) {
                            let _ = errors_tx.send(WatchError::Auth(detail)).await;
                            break;
                        }
                        // The watcher re-establishes the stream with its
                        // own backoff; nothing to do but note it.
                        warn!("{label} watch interrupted: {err}");
                    }
                    None => {
                        let _ = errors_tx.send(WatchError::StreamClosed(label)).await;
                        break;
                    }
                }
            }
        }
        debug!("{label} watch task stopped");
    })
}

/// Extract the failure detail when a watch error is a credential rejection.
fn auth_failure(err: &watcher::Error) -> Option<String> {
    use watcher::Error as We;
    match err {
        We::InitialListFailed(e) | We::WatchStartFailed(e) | We::WatchFailed(e) => match e {
            kube::Error::Api(resp) if resp.code == 401 => Some(resp.message.clone()),
            kube::Error::Auth(auth) => Some(auth.to_string()),
            _ => None,
        },
        We::WatchError(resp) if resp.code == 401 => Some(resp.message.clone()),
        _ => None,
    }
}
