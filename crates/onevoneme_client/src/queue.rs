//! Matchmaking queue polling.
//!
//! Each [`QueueAttempt`] owns one tokio task. The task joins the queue,
//! then probes the player's game state on a fixed interval until a match
//! shows up. Dropping or cancelling the attempt aborts the task, so no poll
//! outlives the attempt that started it.

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientErrorKind};
use crate::identity::PlayerIdentity;
use onevoneme_games::{parse_queue_body, MatchAssignment, QueueBody};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn, Instrument};

/// Progress of a queue attempt.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Poll number `attempt` found no match.
    Pending {
        /// 1-based poll count.
        attempt: u32,
    },
    /// Paired. No events follow.
    Matched(MatchAssignment),
    /// The queue refused the player. No events follow.
    Failed(ClientError),
}

/// Starts queue attempts against a backend.
#[derive(Debug, Clone)]
pub struct QueueClient {
    api: Arc<dyn GameApi>,
    interval: Duration,
}

impl QueueClient {
    /// Creates a queue client using the configured poll interval.
    pub fn new(api: Arc<dyn GameApi>, config: &ClientConfig) -> Self {
        Self {
            api,
            interval: config.queue_interval(),
        }
    }

    /// Starts polling for a match for `identity`.
    #[instrument(skip(self), fields(username = %identity))]
    pub fn enter_queue(&self, identity: PlayerIdentity) -> QueueAttempt {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("queue", username = %identity);
        let task = tokio::spawn(
            run_queue(self.api.clone(), identity, self.interval, tx).instrument(span),
        );
        QueueAttempt { events: rx, task }
    }
}

async fn run_queue(
    api: Arc<dyn GameApi>,
    identity: PlayerIdentity,
    interval: Duration,
    tx: mpsc::UnboundedSender<QueueEvent>,
) {
    info!("Entering queue");
    let me = identity.username();
    let mut joined = false;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let response = if joined {
            api.fetch_snapshot(me).await
        } else {
            api.join_queue(me).await
        };

        match response {
            Err(e) => debug!(attempt, error = %e, "Queue poll failed, retrying"),
            Ok(response) if !response.is_success() && !joined => {
                warn!(status = response.status, "Queue join rejected");
                let err = ClientError::new(ClientErrorKind::QueueRejected {
                    status: response.status,
                    body: response.body.trim().to_string(),
                });
                let _ = tx.send(QueueEvent::Failed(err));
                return;
            }
            Ok(response) if !response.is_success() => {
                debug!(attempt, status = response.status, "Game state probe not ready");
            }
            Ok(response) => {
                joined = true;
                if let QueueBody::Assigned(assignment) = parse_queue_body(&response.body, me) {
                    info!(
                        attempt,
                        game = %assignment.game_type(),
                        opponent = ?assignment.opponent(),
                        "Match found"
                    );
                    let _ = tx.send(QueueEvent::Matched(assignment));
                    return;
                }
                debug!(attempt, "No match yet");
            }
        }

        if tx.send(QueueEvent::Pending { attempt }).is_err() {
            debug!("Queue attempt dropped by caller");
            return;
        }
        sleep(interval).await;
    }
}

/// A running queue attempt.
#[derive(Debug)]
pub struct QueueAttempt {
    events: mpsc::UnboundedReceiver<QueueEvent>,
    task: JoinHandle<()>,
}

impl QueueAttempt {
    /// Next progress event. `None` once the attempt has finished and every
    /// event was read.
    pub async fn next_event(&mut self) -> Option<QueueEvent> {
        self.events.recv().await
    }

    /// Waits until the attempt is matched or fails.
    #[instrument(skip(self))]
    pub async fn wait_for_match(mut self) -> Result<MatchAssignment, ClientError> {
        while let Some(event) = self.next_event().await {
            match event {
                QueueEvent::Pending { .. } => {}
                QueueEvent::Matched(assignment) => return Ok(assignment),
                QueueEvent::Failed(e) => return Err(e),
            }
        }
        Err(ClientError::new(ClientErrorKind::SessionClosed))
    }

    /// Abandons the attempt and waits for the task to stop. No request is
    /// issued after this returns.
    #[instrument(skip(self))]
    pub async fn cancel(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        info!("Queue attempt cancelled");
    }
}

impl Drop for QueueAttempt {
    fn drop(&mut self) {
        self.task.abort();
    }
}
