//! 1v1me client - queue, play and resolve matches against a polling backend
//!
//! The backend holds authoritative state and is only observed through
//! request/response polling. This crate keeps a player's view of a match
//! consistent with it: it paces polls, detects whose turn it is, submits
//! moves with optimistic rendering and rollback, and tears a session down
//! once the server forgets the match.
//!
//! # Architecture
//!
//! - **Identity**: username policy and a swappable [`SessionStore`]
//! - **Queue**: one cancellable polling task per queue attempt
//! - **Machine**: pure session state machine ([`SessionMachine`])
//! - **Poller / Submitter**: cadence, normalization and bounded retries
//! - **Session**: one task per match owning every timer ([`SessionHandle`])
//!
//! # Example
//!
//! ```no_run
//! use onevoneme_client::{ClientConfig, MatchClient, PlayerMove, SessionEvent};
//! use onevoneme_games::Location;
//!
//! # async fn example() -> Result<(), onevoneme_client::ClientError> {
//! let client = MatchClient::from_config(ClientConfig::default())?;
//! let (alice, _) = client.register("alice").await?;
//! let mut session = client.find_match(alice).await?;
//!
//! if let Some(location) = Location::new(1, 1) {
//!     session.submit(PlayerMove::Place(location)).await?;
//! }
//! while let Some(event) = session.next_event().await {
//!     if let SessionEvent::TornDown { .. } = event {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod api;
mod client;
mod config;
mod error;
mod identity;
mod lobby;
mod machine;
mod poller;
mod queue;
mod registration;
mod session;
mod submitter;
mod view;

// Crate-level exports - Transport
pub use api::{ApiResponse, GameApi, HttpGameApi};

// Crate-level exports - Facade
pub use client::MatchClient;

// Crate-level exports - Configuration
pub use config::{BASE_URL_ENV, ClientConfig, ConfigError, RegistrationPolicy, SESSION_FILE_ENV};

// Crate-level exports - Errors
pub use error::{ClientError, ClientErrorKind};

// Crate-level exports - Identity
pub use identity::{
    CURRENT_USER_KEY, FileSessionStore, IdentityStore, MAX_USERNAME_LEN, MIN_USERNAME_LEN,
    MemorySessionStore, PlayerIdentity, SessionStore,
};

// Crate-level exports - Lobby
pub use lobby::{BackendHealth, LeaderboardEntry, check_health, leaderboard};

// Crate-level exports - Session state machine
pub use machine::{
    IgnoreReason, Observation, Phase, PlayerMove, PollTarget, PollingMode, SessionEvent,
    SessionMachine, TeardownReason,
};

// Crate-level exports - Polling and submission
pub use poller::{PollSchedule, fetch_observation};
pub use queue::{QueueAttempt, QueueClient, QueueEvent};
pub use registration::{RegistrationStatus, classify as classify_registration, register};
pub use session::{SessionHandle, SessionSummary, SubmitOutcome};
pub use submitter::MoveSubmitter;

// Crate-level exports - View
pub use view::{SessionView, Verdict};
