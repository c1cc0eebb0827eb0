//! 1v1me game model - the shared vocabulary of the match client
//!
//! Slots, outcomes, boards and throws for the two supported minigames,
//! plus tolerant readers for the server's snapshot and queue bodies.
//!
//! # Architecture
//!
//! - **Slots and outcomes**: integer wire encodings decoded into enums
//! - **Games**: tic-tac-toe board and rock-paper-scissors round
//! - **Snapshots**: polymorphic authoritative views, normalized from JSON
//! - **Assignments**: matchmaking results read from queue responses
//!
//! # Example
//!
//! ```
//! use onevoneme_games::{parse_snapshot, GameType, Outcome, SnapshotBody};
//!
//! let body = r#"{"type":"tictactoe","turn":1,"winner":-1}"#;
//! let SnapshotBody::Present(snapshot) = parse_snapshot(body, GameType::TicTacToe) else {
//!     panic!("expected a snapshot");
//! };
//! assert_eq!(snapshot.outcome(), Outcome::Draw);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assignment;
mod game_type;
mod outcome;
mod rps;
mod slot;
mod snapshot;
mod tictactoe;

pub use assignment::{parse_queue_body, MatchAssignment, QueueBody};
pub use game_type::GameType;
pub use outcome::Outcome;
pub use rps::{Choice, RpsRound};
pub use slot::PlayerSlot;
pub use snapshot::{
    parse_opponent_choice, parse_snapshot, GameSnapshot, OpponentMove, SnapshotBody,
    SnapshotPayload,
};
pub use tictactoe::{Board, Cell, Location};
