//! High-level client tying registration, queueing and sessions together.

use crate::api::{GameApi, HttpGameApi};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::identity::{FileSessionStore, IdentityStore, MemorySessionStore, PlayerIdentity, SessionStore};
use crate::lobby::{self, BackendHealth, LeaderboardEntry};
use crate::machine::SessionMachine;
use crate::queue::{QueueAttempt, QueueClient};
use crate::registration::{self, RegistrationStatus};
use crate::session::SessionHandle;
use onevoneme_games::MatchAssignment;
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point for a player.
#[derive(Debug, Clone)]
pub struct MatchClient {
    config: ClientConfig,
    api: Arc<dyn GameApi>,
    identities: IdentityStore,
}

impl MatchClient {
    /// Creates a client from its parts.
    pub fn new(config: ClientConfig, api: Arc<dyn GameApi>, identities: IdentityStore) -> Self {
        Self {
            config,
            api,
            identities,
        }
    }

    /// HTTP client with the store named in the config (memory if none).
    #[instrument(skip(config), fields(base_url = %config.base_url()))]
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let api = Arc::new(HttpGameApi::new(&config)?);
        let store: Arc<dyn SessionStore> = match config.session_file() {
            Some(path) => Arc::new(FileSessionStore::new(path.clone())),
            None => Arc::new(MemorySessionStore::new()),
        };
        Ok(Self::new(config, api, IdentityStore::new(store)))
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Registers `raw` as the current player.
    pub async fn register(
        &self,
        raw: &str,
    ) -> Result<(PlayerIdentity, RegistrationStatus), ClientError> {
        registration::register(
            self.api.as_ref(),
            &self.identities,
            self.config.registration(),
            raw,
        )
        .await
    }

    /// The remembered player, if any.
    pub fn whoami(&self) -> Result<Option<PlayerIdentity>, ClientError> {
        self.identities.current()
    }

    /// Forgets the remembered player.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.identities.forget()
    }

    /// Starts polling the matchmaker for `identity`.
    pub fn enter_queue(&self, identity: PlayerIdentity) -> QueueAttempt {
        QueueClient::new(self.api.clone(), &self.config).enter_queue(identity)
    }

    /// Starts a session for a match `identity` was assigned to.
    #[instrument(skip(self, assignment), fields(username = %identity))]
    pub fn start_session(&self, identity: PlayerIdentity, assignment: MatchAssignment) -> SessionHandle {
        let mut machine = SessionMachine::new(identity, &self.config);
        machine.enter_queue();
        machine.on_assignment(assignment);
        info!(phase = %machine.phase(), "Session starting");
        SessionHandle::spawn(self.api.clone(), &self.config, machine)
    }

    /// Queues `identity` and starts a session once matched.
    #[instrument(skip(self), fields(username = %identity))]
    pub async fn find_match(&self, identity: PlayerIdentity) -> Result<SessionHandle, ClientError> {
        let assignment = self.enter_queue(identity.clone()).wait_for_match().await?;
        Ok(self.start_session(identity, assignment))
    }

    /// Probes backend health.
    pub async fn health(&self) -> Result<BackendHealth, ClientError> {
        lobby::check_health(self.api.as_ref()).await
    }

    /// Registered players ranked by wins.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, ClientError> {
        lobby::leaderboard(self.api.as_ref()).await
    }
}
