//! `decider_core` implements deterministic experiment bucketing and targeting: it assigns users
//! to experiment variants with a seeded hash, evaluates boolean targeting predicates over
//! caller-supplied attributes, and resolves variant overrides with defined precedence.
//!
//! # Overview
//!
//! [`Document`] is the heart of the crate. It is an immutable snapshot of all named experiment
//! configurations, decoded from a JSON manifest file.
//!
//! [`DocumentStore`](document_store::DocumentStore) is a thread-safe multi-reader multi-writer
//! in-memory manager for [`Document`]. The job of the document store is to be the central
//! authority on which document is currently active. Whenever the manifest changes, the document
//! is replaced completely. When a reader gets a document, it receives a *snapshot* that is not
//! affected by further writes: a `variant` call that starts against one document version
//! completes entirely against that version even if a reload happens mid-call.
//!
//! [`ManifestLoader`](manifest_loader::ManifestLoader) knows how to read and parse a [`Document`]
//! from a manifest file on disk, skipping re-parses when the file hasn't changed.
//!
//! [`PollerThread`](poller_thread::PollerThread) launches a background thread that periodically
//! reloads the manifest (using `ManifestLoader`) and updates the `DocumentStore`. This is the
//! simplest way to keep the active document up-to-date.
//!
//! The [`experiments`] module contains the evaluation machinery: variant-set strategies,
//! targeting predicate trees, and the per-experiment decision algorithm. Evaluation functions
//! are pure, with no side effects, no I/O, and no global state.
//!
//! [`Experiments`] ties it together: it resolves experiment names against the current document
//! snapshot and dispatches `variant` and `expose` calls.
//!
//! Most services are built from a `DocumentStore`, a `PollerThread`, and an `Experiments`
//! registry.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod document_store;
pub mod experiments;
pub mod manifest_loader;
pub mod poller_thread;
pub mod sharder;

mod attributes;
mod document;
mod error;
mod events;
mod registry;

pub use attributes::{AttributeValue, Attributes};
pub use document::{Document, ExperimentConfig, ExperimentDefinition, Timestamp, TryParse};
pub use error::{Error, Result};
pub use events::{EventLogger, ExposureEvent};
pub use registry::Experiments;
