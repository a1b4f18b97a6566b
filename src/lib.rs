//! An embeddable feature-toggle evaluation engine.
//!
//! # Overview
//!
//! The engine revolves around a [`Client`] that decides, for a feature name and an evaluation
//! [`Context`], whether the feature is enabled and which variant applies. Features are described
//! by [`FeatureDefinition`](models::FeatureDefinition)s: each carries strategy bindings (a named
//! [`Strategy`](strategy::Strategy) with parameters, constraints and segment references) and
//! optionally weighted variants.
//!
//! Definitions are held by a [`Repository`](repository::Repository), which loads them from a
//! [`BackupStore`](storage::BackupStore) and a [`BootstrapProvider`](bootstrap::BootstrapProvider)
//! on start and, when a [`RemoteSource`](poller_thread::RemoteSource) is configured, refreshes
//! them from a background thread. Every refresh replaces the whole
//! [`Snapshot`](models::Snapshot), so evaluation always sees a consistent set of features and
//! segments.
//!
//! Percentage rollouts and variant selection hash identifiers with MurmurHash3 (see
//! [`normalize`](normalize::normalize)), so the same user lands in the same bucket in every
//! process and in every SDK using the same scheme.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Evaluation never fails: malformed definitions, unknown operators and values that cannot be
//! coerced make the affected rule evaluate to `false`. Problems with inbound data are reported as
//! `warn` and `error` [events](events::Event) instead.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with the `toggle_engine`
//! target and structured key-values. Consider integrating a `log`-compatible logger
//! implementation for better visibility into engine operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod constraints;
pub mod eval;
pub mod events;
pub mod models;
pub mod normalize;
pub mod poller_thread;
pub mod repository;
pub mod snapshot_store;
pub mod storage;
pub mod strategy;
pub mod variant;

mod client;
mod config;
mod context;
mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use eval::{Evaluation, EvaluationResult};
pub use variant::Variant;
