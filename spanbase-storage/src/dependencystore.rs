//! Contract for storing aggregated service dependency links.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use spanbase_model::DependencyLink;

use crate::error::Result;

/// Stores dependency snapshots labeled by the end of the interval they
/// summarize. No ordering is assumed between snapshots from distinct
/// writers.
#[async_trait]
pub trait DependencyWriter: Send + Sync + Debug {
    async fn write_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        links: Vec<DependencyLink>,
    ) -> Result<()>;
}

/// Reads the union of dependency links whose snapshot label falls within
/// `[end_ts - lookback, end_ts]`. Callers sort if they need an order.
#[async_trait]
pub trait DependencyReader: Send + Sync + Debug {
    async fn get_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        lookback: TimeDelta,
    ) -> Result<Vec<DependencyLink>>;
}
