//! Scripted in-memory backend shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use onevoneme_client::{ApiResponse, ClientError, GameApi};
use onevoneme_games::{Choice, Location};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Which backend operation a reply or call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Register,
    JoinQueue,
    Snapshot,
    MakeMove,
    SetChoice,
    OpponentChoice,
    Health,
    Users,
}

/// A scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    TransportError,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Status(200, body.into())
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status(status, body.into())
    }
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(String),
    JoinQueue(String),
    Snapshot(String),
    MakeMove {
        game_id: String,
        username: String,
        location: Location,
    },
    SetChoice {
        game_id: String,
        username: String,
        choice: Choice,
    },
    OpponentChoice {
        game_id: String,
        opponent: String,
    },
    Health,
    Users,
}

impl Call {
    fn endpoint(&self) -> Endpoint {
        match self {
            Self::Register(_) => Endpoint::Register,
            Self::JoinQueue(_) => Endpoint::JoinQueue,
            Self::Snapshot(_) => Endpoint::Snapshot,
            Self::MakeMove { .. } => Endpoint::MakeMove,
            Self::SetChoice { .. } => Endpoint::SetChoice,
            Self::OpponentChoice { .. } => Endpoint::OpponentChoice,
            Self::Health => Endpoint::Health,
            Self::Users => Endpoint::Users,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<Endpoint, VecDeque<Reply>>,
    defaults: HashMap<Endpoint, Reply>,
    delays: HashMap<Endpoint, Duration>,
    calls: Vec<(Instant, Call)>,
}

/// [`GameApi`] answering from per-endpoint queues.
///
/// Each endpoint pops its queue first and falls back to its default reply
/// (an empty 200 unless set) once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot reply.
    pub fn push(&self, endpoint: Endpoint, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(endpoint)
            .or_default()
            .push_back(reply);
        self
    }

    /// Queues the same reply `times` times.
    pub fn push_n(&self, endpoint: Endpoint, reply: Reply, times: usize) -> &Self {
        for _ in 0..times {
            self.push(endpoint, reply.clone());
        }
        self
    }

    /// Sets the reply used once the queue is empty.
    pub fn set_default(&self, endpoint: Endpoint, reply: Reply) -> &Self {
        self.script.lock().unwrap().defaults.insert(endpoint, reply);
        self
    }

    /// Delays every answer of `endpoint`.
    pub fn set_delay(&self, endpoint: Endpoint, delay: Duration) -> &Self {
        self.script.lock().unwrap().delays.insert(endpoint, delay);
        self
    }

    /// Every request so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.timed_calls().into_iter().map(|(_, call)| call).collect()
    }

    /// Every request so far with the instant it was issued.
    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Issue instants of the requests to `endpoint`.
    pub fn times(&self, endpoint: Endpoint) -> Vec<Instant> {
        self.timed_calls()
            .into_iter()
            .filter(|(_, call)| call.endpoint() == endpoint)
            .map(|(at, _)| at)
            .collect()
    }

    /// Number of requests made to `endpoint`.
    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, call)| call.endpoint() == endpoint)
            .count()
    }

    async fn answer(&self, call: Call) -> Result<ApiResponse, ClientError> {
        let endpoint = call.endpoint();
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push((Instant::now(), call));
            let reply = script
                .queued
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.defaults.get(&endpoint).cloned())
                .unwrap_or_else(|| Reply::ok(""));
            (reply, script.delays.get(&endpoint).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Status(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::TransportError => Err(ClientError::transport("scripted connection reset")),
        }
    }
}

#[async_trait]
impl GameApi for ScriptedApi {
    async fn register(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.answer(Call::Register(username.to_string())).await
    }

    async fn join_queue(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.answer(Call::JoinQueue(username.to_string())).await
    }

    async fn fetch_snapshot(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.answer(Call::Snapshot(username.to_string())).await
    }

    async fn make_move(
        &self,
        game_id: &str,
        username: &str,
        location: Location,
    ) -> Result<ApiResponse, ClientError> {
        self.answer(Call::MakeMove {
            game_id: game_id.to_string(),
            username: username.to_string(),
            location,
        })
        .await
    }

    async fn set_choice(
        &self,
        game_id: &str,
        username: &str,
        choice: Choice,
    ) -> Result<ApiResponse, ClientError> {
        self.answer(Call::SetChoice {
            game_id: game_id.to_string(),
            username: username.to_string(),
            choice,
        })
        .await
    }

    async fn fetch_opponent_choice(
        &self,
        game_id: &str,
        opponent: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.answer(Call::OpponentChoice {
            game_id: game_id.to_string(),
            opponent: opponent.to_string(),
        })
        .await
    }

    async fn health(&self) -> Result<ApiResponse, ClientError> {
        self.answer(Call::Health).await
    }

    async fn users(&self) -> Result<ApiResponse, ClientError> {
        self.answer(Call::Users).await
    }
}

/// Tic-tac-toe snapshot body for alice (slot 1) against bob (slot 2).
pub fn ttt_snapshot(turn: i64, outcome: i64, board: [[i64; 3]; 3]) -> String {
    serde_json::json!({
        "gameType": "tictactoe",
        "turnOwner": turn,
        "outcome": outcome,
        "board": board,
        "usernameToSlot": { "alice": 1, "bob": 2 },
    })
    .to_string()
}

/// Opponent-move body for bob.
pub fn bob_choice(choice: Option<&str>) -> String {
    serde_json::json!({ "username": "bob", "choice": choice }).to_string()
}
