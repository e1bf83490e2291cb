//! Kubernetes resource observer.
//!
//! Subscribes to a remote change feed for one or more resource kinds,
//! classifies each change, applies suppression rules, and emits
//! [`cluster_events::ClusterEvent`] values onto an output channel.
//!
//! Two watch modes share the event model and the downstream pipeline:
//!
//! - [`WatchMode::Typed`] — per-object pod/node watches; every add, update
//!   and delete is emitted, no suppression.
//! - [`WatchMode::ClusterEvents`] — the cluster-level `Event` feed with
//!   repeat suppression and noisy-source filtering.
//!
//! Transport-level watch interruptions are retried by the underlying
//! `kube` watcher with its own backoff; the observer adds none. Credential
//! rejections are unrecoverable and reported on a separate error channel.

pub mod classify;
mod config;
mod error;
mod observer;

pub use classify::ChangeType;
pub use config::{WatchConfig, WatchMode};
pub use error::{Result, WatchError};
pub use observer::{Observer, ObserverHandle};
