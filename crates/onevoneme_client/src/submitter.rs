//! Move submission with bounded retries.

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientErrorKind};
use crate::machine::PlayerMove;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Sends moves to the backend.
///
/// Transport failures are retried with doubling backoff up to the
/// configured number of extra attempts. A status response is final: 2xx is
/// success, anything else is a `Rejected` error and is not retried.
#[derive(Debug, Clone)]
pub struct MoveSubmitter {
    api: Arc<dyn GameApi>,
    config: ClientConfig,
}

impl MoveSubmitter {
    /// Creates a submitter.
    pub fn new(api: Arc<dyn GameApi>, config: ClientConfig) -> Self {
        Self { api, config }
    }

    async fn send_once(
        &self,
        game_id: &str,
        username: &str,
        mv: PlayerMove,
    ) -> Result<crate::api::ApiResponse, ClientError> {
        match mv {
            PlayerMove::Place(location) => self.api.make_move(game_id, username, location).await,
            PlayerMove::Throw(choice) => self.api.set_choice(game_id, username, choice).await,
        }
    }

    /// Sends `mv` for `username` in `game_id`.
    #[instrument(skip(self), fields(mv = %mv))]
    pub async fn submit(&self, game_id: &str, username: &str, mv: PlayerMove) -> Result<(), ClientError> {
        let retries = *self.config.submit_retries();
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(game_id, username, mv).await {
                Ok(response) if response.is_success() => {
                    info!(attempt, status = response.status, "Move accepted");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(status = response.status, body = %response.body, "Move rejected");
                    return Err(ClientError::new(ClientErrorKind::Rejected {
                        status: response.status,
                        body: response.body,
                    }));
                }
                Err(e) if e.is_transient() && attempt < retries => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff(attempt);
                    debug!(attempt, ?backoff, error = %e, "Move send failed, retrying");
                    sleep(backoff).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Move send failed");
                    return Err(e);
                }
            }
        }
    }
}
