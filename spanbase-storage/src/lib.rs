//! Storage layer of the spanbase tracing backend.
//!
//! Everything a backend must offer is expressed as a small set of async
//! contracts ([`spanstore`], [`dependencystore`], [`samplingstore`])
//! aggregated behind a capability façade ([`factory::Backend`]). Two
//! implementations ship with the crate: a bounded in-memory store and a
//! sled-backed durable store. The [`query`] module layers validation,
//! adjusters and deterministic ordering on top of any reader, and
//! [`sampling`] serves remote sampling strategies out of the sampling
//! store.
//!
//! Backends are conformance-tested through the reusable harness in
//! [`testing`] (behind the `testing` feature), which drives golden fixtures
//! through the same contracts every production caller uses.
#![warn(future_incompatible, nonstandard_style, rust_2018_idioms)]

pub mod config;
pub mod dependencystore;
pub mod error;
pub mod factory;
pub mod memory;
pub mod query;
pub mod sampling;
pub mod samplingstore;
pub mod sledstore;
pub mod spanstore;
pub mod tlsconfig;

#[cfg(any(feature = "testing", test))]
pub mod testing;

pub use error::{Result, StorageError};
