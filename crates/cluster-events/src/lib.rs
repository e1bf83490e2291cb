//! Typed cluster change events.
//!
//! This crate defines the event model shared by the resource observer and the
//! notification pipeline: a [`ClusterEvent`] describes one detected change,
//! classified by [`EventKind`] and optionally leveled by [`Severity`].

mod event;

pub use event::{ClusterEvent, EventKind, ResourceKind, Severity};
