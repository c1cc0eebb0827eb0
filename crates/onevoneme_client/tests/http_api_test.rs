//! HTTP transport against an in-process axum backend.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use onevoneme_client::{
    ClientConfig, ClientErrorKind, GameApi, HttpGameApi, IdentityStore, MatchClient, Observation,
    PollTarget, RegistrationStatus, SessionEvent, TeardownReason, Verdict, fetch_observation,
};
use onevoneme_games::{Choice, GameType, Location, Outcome, PlayerSlot};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake backend: bob is already waiting in the queue.
#[derive(Debug)]
struct Backend {
    users: BTreeSet<String>,
    queued: Vec<String>,
    board: [[i64; 3]; 3],
    turn: i64,
    outcome: i64,
    finished_reads: u32,
    bodies: Vec<(String, Value)>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            users: BTreeSet::from(["bob".to_string()]),
            queued: vec!["bob".to_string()],
            board: [[0; 3]; 3],
            turn: 1,
            outcome: 0,
            finished_reads: 0,
            bodies: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<Backend>>;

async fn register(State(state): State<Shared>, Path(name): Path<String>) -> (StatusCode, String) {
    let mut backend = state.lock().unwrap();
    if name == "banned" {
        return (StatusCode::BAD_REQUEST, "name not allowed".to_string());
    }
    if !backend.users.insert(name) {
        return (StatusCode::CONFLICT, "User already exists".to_string());
    }
    (StatusCode::ACCEPTED, String::new())
}

async fn queue(State(state): State<Shared>, Path(name): Path<String>) -> (StatusCode, String) {
    let mut backend = state.lock().unwrap();
    if !backend.users.contains(&name) {
        return (StatusCode::BAD_REQUEST, "unknown user".to_string());
    }
    backend.queued.push(name);
    (StatusCode::OK, String::new())
}

async fn gamestate(State(state): State<Shared>, Path(name): Path<String>) -> (StatusCode, String) {
    let mut backend = state.lock().unwrap();
    if !backend.queued.contains(&name) || backend.queued.len() < 2 {
        return (StatusCode::OK, String::new());
    }
    if backend.outcome != 0 {
        backend.finished_reads += 1;
        if backend.finished_reads > 2 {
            return (StatusCode::OK, String::new());
        }
    }
    let body = json!({
        "type": "tictactoe",
        "turn": backend.turn,
        "winner": backend.outcome,
        "won": backend.outcome != 0,
        "totalBoard": backend.board,
        "usernameToTacNumber": { "alice": 1, "bob": 2 },
    });
    (StatusCode::OK, body.to_string())
}

async fn make_move(
    State(state): State<Shared>,
    Path((game, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut backend = state.lock().unwrap();
    backend.bodies.push((format!("make_move/{game}/{name}"), body.clone()));
    let (Some(row), Some(col)) = (body["location"][0].as_u64(), body["location"][1].as_u64())
    else {
        return StatusCode::BAD_REQUEST;
    };
    let (row, col) = (row as usize, col as usize);
    if backend.board[row][col] != 0 {
        return StatusCode::BAD_REQUEST;
    }
    backend.board[row][col] = 1;
    backend.turn = 2;
    // Bob resigns after the first move.
    backend.outcome = 1;
    StatusCode::OK
}

async fn set_move(
    State(state): State<Shared>,
    Path(game): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state
        .lock()
        .unwrap()
        .bodies
        .push((format!("set_move/{game}"), body));
    StatusCode::OK
}

async fn get_move(Path((_game, opponent)): Path<(String, String)>) -> Json<Value> {
    Json(json!({ "username": opponent, "rps": "ROCK" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "UP", "message": "1v1me backend is running" }))
}

async fn users() -> Json<Value> {
    Json(json!({
        "carol": { "name": "carol", "gamesWon": 3, "gamesPlayed": 4 },
        "alice": { "name": "alice", "gamesWon": 5, "gamesPlayed": 9 },
        "bob": { "name": "bob", "gamesWon": 3, "gamesPlayed": 7 },
    }))
}

/// Serves the fake backend on an ephemeral port; returns the API root.
async fn spawn_backend(state: Shared) -> String {
    let app = Router::new()
        .route("/api/register/{name}", post(register))
        .route("/api/queue/{name}", post(queue))
        .route("/api/gamestate/{name}", get(gamestate))
        .route("/api/make_move/{game}/{name}", post(make_move))
        .route("/api/set_move/{game}", post(set_move))
        .route("/api/get_move/{game}/{opponent}", get(get_move))
        .route("/api/health", get(health))
        .route("/api/users", get(users))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn fast_config(base_url: String) -> ClientConfig {
    ClientConfig::default()
        .with_base_url(base_url)
        .with_queue_interval_ms(20)
        .with_poll_interval_ms(20)
        .with_burst_spacing_ms(10)
        .with_gone_grace_ms(50)
        .with_teardown_delay_ms(2000)
}

#[tokio::test]
async fn registration_follows_status_policy() {
    let state = Shared::default();
    let config = fast_config(spawn_backend(state.clone()).await);
    let identities = IdentityStore::in_memory();
    let client = MatchClient::new(
        config.clone(),
        Arc::new(HttpGameApi::new(&config).unwrap()),
        identities.clone(),
    );

    let (alice, status) = client.register("  alice ").await.unwrap();
    assert_eq!(alice.username(), "alice");
    assert_eq!(status, RegistrationStatus::Created);
    assert_eq!(client.whoami().unwrap(), Some(alice.clone()));

    let (_, status) = client.register("alice").await.unwrap();
    assert_eq!(status, RegistrationStatus::AlreadyExists { status: 409 });

    client.logout().unwrap();
    let err = client.register("banned").await.unwrap_err();
    assert_eq!(
        err.kind(),
        &ClientErrorKind::RegistrationRejected {
            status: 400,
            body: "name not allowed".to_string()
        }
    );
    assert_eq!(identities.current().unwrap(), None);
}

#[tokio::test]
async fn request_bodies_match_the_backend_contract() {
    let state = Shared::default();
    let config = fast_config(spawn_backend(state.clone()).await);
    let api = HttpGameApi::new(&config).unwrap();

    let response = api
        .make_move("tictactoe", "alice", Location::new(0, 2).unwrap())
        .await
        .unwrap();
    assert!(response.is_success());
    let response = api
        .set_choice("rock_paper_scissors", "alice", Choice::Scissors)
        .await
        .unwrap();
    assert!(response.is_success());

    let bodies = state.lock().unwrap().bodies.clone();
    assert_eq!(
        bodies,
        vec![
            (
                "make_move/tictactoe/alice".to_string(),
                json!({ "username": "alice", "location": [0, 2] })
            ),
            (
                "set_move/rock_paper_scissors".to_string(),
                json!({ "username": "alice", "choice": "SCISSORS" })
            ),
        ]
    );
}

#[tokio::test]
async fn observations_decode_backend_bodies() {
    let state = Shared::default();
    state.lock().unwrap().queued.push("alice".to_string());
    let config = fast_config(spawn_backend(state.clone()).await);
    let api = HttpGameApi::new(&config).unwrap();

    let target = PollTarget::GameState {
        username: "alice".to_string(),
    };
    match fetch_observation(&api, &target, GameType::TicTacToe).await {
        Observation::Snapshot(snapshot) => {
            assert_eq!(snapshot.turn_owner(), PlayerSlot::One);
            assert_eq!(snapshot.outcome(), Outcome::InProgress);
            assert_eq!(snapshot.slot_of("bob"), PlayerSlot::Two);
        }
        other => panic!("unexpected {other:?}"),
    }

    let target = PollTarget::GameState {
        username: "carol".to_string(),
    };
    assert_eq!(
        fetch_observation(&api, &target, GameType::TicTacToe).await,
        Observation::Absent
    );

    let target = PollTarget::OpponentChoice {
        game_id: "rock_paper_scissors".to_string(),
        opponent: "bob".to_string(),
    };
    assert_eq!(
        fetch_observation(&api, &target, GameType::RockPaperScissors).await,
        Observation::OpponentChoice(Some(Choice::Rock))
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = ClientConfig::default()
        .with_base_url(format!("http://{addr}/api"))
        .with_request_timeout_ms(500);
    let api = HttpGameApi::new(&config).unwrap();

    let err = api.health().await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn health_and_leaderboard() {
    let config = fast_config(spawn_backend(Shared::default()).await);
    let client = MatchClient::from_config(config).unwrap();

    let health = client.health().await.unwrap();
    assert!(*health.up());
    assert_eq!(health.status(), &200);
    assert_eq!(health.message().as_deref(), Some("1v1me backend is running"));

    let board = client.leaderboard().await.unwrap();
    let names: Vec<&str> = board.iter().map(|e| e.username().as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert_eq!(board[0].games_won(), &5);
    assert_eq!(board[0].games_played(), &9);
}

#[tokio::test]
async fn queue_play_and_resolve_over_http() {
    let state = Shared::default();
    let config = fast_config(spawn_backend(state.clone()).await);
    let client = MatchClient::from_config(config).unwrap();
    let (alice, _) = client.register("alice").await.unwrap();

    let mut session = client.find_match(alice).await.unwrap();
    let run = async {
        let mut submitted = false;
        loop {
            match session.next_event().await {
                Some(SessionEvent::PhaseChanged { to, .. })
                    if to == onevoneme_client::Phase::MyTurn && !submitted =>
                {
                    submitted = true;
                    let mv = onevoneme_client::PlayerMove::Place(Location::new(1, 1).unwrap());
                    session.submit(mv).await.unwrap();
                }
                Some(SessionEvent::Resolved { verdict, .. }) => {
                    assert_eq!(verdict, Some(Verdict::YouWon));
                }
                Some(SessionEvent::TornDown { reason }) => return reason,
                Some(_) => {}
                None => panic!("session ended without a teardown event"),
            }
        }
    };
    let reason = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("match did not finish");
    assert_eq!(reason, TeardownReason::Gone);
    assert_eq!(state.lock().unwrap().board[1][1], 1);

    let summary = session.join().await.unwrap();
    assert!(summary.timers_cleared);
}
