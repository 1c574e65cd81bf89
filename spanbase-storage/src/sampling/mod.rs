//! Remote sampling: wire contract, strategy service and the adaptive
//! probability recomputer.
//!
//! The sampling path runs in a loop: the span write path accumulates
//! throughput, the [`adaptive::ProbabilityRecomputer`] periodically turns
//! throughput into fresh probability snapshots, and the
//! [`strategy::StrategyProvider`] serves the latest snapshot to remote
//! client samplers through the wire types in [`remote`].

pub mod adaptive;
pub mod remote;
pub mod strategy;
