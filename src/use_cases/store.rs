// Port for the external result-persistence collaborator.

use crate::domain::MatchRecord;
use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store unavailable")]
    Unavailable,
    #[error("result store rejected the record: {0}")]
    Rejected(String),
}

/// Persistence seam for finished and abandoned matches.
///
/// Implemented over HTTP in the adapters layer; sessions only see the port.
pub trait MatchStore: Send + Sync {
    /// Persists a completed match record.
    fn submit_result<'a>(&'a self, record: &'a MatchRecord)
    -> BoxFuture<'a, Result<(), StoreError>>;

    /// Marks a match that ended before play started.
    fn cancel_match<'a>(&'a self, game_id: u64) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Store used when no result service is configured; accepts everything.
pub struct NoopStore;

impl MatchStore for NoopStore {
    fn submit_result<'a>(
        &'a self,
        _record: &'a MatchRecord,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }

    fn cancel_match<'a>(&'a self, _game_id: u64) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}
