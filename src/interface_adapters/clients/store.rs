use crate::domain::MatchRecord;
use crate::use_cases::store::{MatchStore, StoreError};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Result submission payload consumed by the match history service.
#[derive(Debug, Serialize)]
struct MatchResultRequest<'a> {
    game_id: u64,
    game_type: &'a str,
    player1: &'a str,
    player2: &'a str,
    score1: u32,
    score2: u32,
    winner: Option<&'a str>,
    forfeit: bool,
}

impl<'a> MatchResultRequest<'a> {
    fn from_record(record: &'a MatchRecord) -> Self {
        Self {
            game_id: record.game_id,
            game_type: record.game_type.as_wire(),
            player1: &record.player1,
            player2: &record.player2,
            score1: record.score.0,
            score2: record.score.1,
            winner: record.winner.as_deref(),
            forfeit: record.forfeit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// Thin reqwest client for the result-persistence service.
#[derive(Clone)]
pub struct MatchStoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl MatchStoreClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn post_result(&self, record: &MatchRecord) -> Result<(), StoreError> {
        let url = format!("{}/matches/result", self.base_url);
        let response = self
            .http
            .post(url)
            .json(&MatchResultRequest::from_record(record))
            .send()
            .await
            .map_err(|_| StoreError::Unavailable)?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status().is_client_error() {
            // A rejected record will not succeed on retry; surface the reason.
            let body = response
                .json::<ErrorBody>()
                .await
                .map_err(|_| StoreError::Unavailable)?;
            return Err(StoreError::Rejected(body.message));
        }
        Err(StoreError::Unavailable)
    }

    async fn post_cancel(&self, game_id: u64) -> Result<(), StoreError> {
        let url = format!("{}/matches/{}/cancel", self.base_url, game_id);
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|_| StoreError::Unavailable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

impl MatchStore for MatchStoreClient {
    fn submit_result<'a>(
        &'a self,
        record: &'a MatchRecord,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.post_result(record))
    }

    fn cancel_match<'a>(&'a self, game_id: u64) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.post_cancel(game_id))
    }
}
