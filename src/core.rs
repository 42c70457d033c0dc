//! Engine hub: wires the intern service, the point store, and the
//! engine-level configuration together, and hands out queries.

use std::sync::Arc;

use crate::query::Query;
use crate::store::{PointStore, POINTS_FAMILY};
use crate::telemetry::{noop_event_listener, QueryEventListener};
use crate::uid::Uids;

/// Configuration options for the query engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Column family holding data points.
    pub family: Vec<u8>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn QueryEventListener>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            family: POINTS_FAMILY.to_vec(),
            event_listener: noop_event_listener(),
        }
    }
}

/// Entry point of the query core.
///
/// Holds the shared, read-only collaborators; each call to
/// [`QueryEngine::query`] produces an independent single-shot [`Query`].
#[derive(Debug)]
pub struct QueryEngine {
    uids: Uids,
    store: Arc<dyn PointStore>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(uids: Uids, store: Arc<dyn PointStore>) -> Self {
        Self::with_config(uids, store, EngineConfig::default())
    }

    pub fn with_config(uids: Uids, store: Arc<dyn PointStore>, config: EngineConfig) -> Self {
        Self { uids, store, config }
    }

    /// Creates a fresh, unconfigured query against this engine's store.
    pub fn query(&self) -> Query {
        Query::new(
            self.uids.clone(),
            self.store.clone(),
            self.config.event_listener.clone(),
            self.config.family.clone(),
        )
    }

    pub fn uids(&self) -> &Uids {
        &self.uids
    }
}
