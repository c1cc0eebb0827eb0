//! onevoneme - terminal client
//!
//! Registers a username, queues for a match and plays it with line input.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use onevoneme_client::{
    ClientConfig, MatchClient, Phase, PlayerMove, QueueEvent, SessionEvent, SessionView,
    SubmitOutcome,
};
use onevoneme_games::{Choice, GameType, Location};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,onevoneme_client=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = MatchClient::from_config(load_config(&cli)?)?;

    match cli.command {
        Command::Register { name } => run_register(&client, &name).await,
        Command::Whoami => run_whoami(&client),
        Command::Logout => run_logout(&client),
        Command::Health => run_health(&client).await,
        Command::Leaderboard { limit } => run_leaderboard(&client, limit).await,
        Command::Play { name } => run_play(&client, name).await,
    }
}

/// Config file, then environment, then command-line overrides.
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
        config.validate()?;
    }
    if config.session_file().is_none() {
        config = config.with_session_file(default_session_file());
    }
    Ok(config)
}

fn default_session_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".onevoneme").join("session.json"),
        None => PathBuf::from(".onevoneme_session.json"),
    }
}

async fn run_register(client: &MatchClient, name: &str) -> Result<()> {
    let (identity, status) = client.register(name).await?;
    match status {
        onevoneme_client::RegistrationStatus::Created => println!("Registered as {identity}."),
        onevoneme_client::RegistrationStatus::AlreadyExists { .. } => {
            println!("{identity} is already registered. You can queue with this name.")
        }
    }
    Ok(())
}

fn run_whoami(client: &MatchClient) -> Result<()> {
    match client.whoami()? {
        Some(identity) => println!("{identity}"),
        None => println!("Not registered. Run `onevoneme register <name>`."),
    }
    Ok(())
}

fn run_logout(client: &MatchClient) -> Result<()> {
    client.logout()?;
    println!("Logged out.");
    Ok(())
}

async fn run_health(client: &MatchClient) -> Result<()> {
    let health = client.health().await?;
    let message = health.message().as_deref().unwrap_or("");
    if *health.up() {
        println!("Backend UP (HTTP {}) {message}", health.status());
        Ok(())
    } else {
        anyhow::bail!("Backend DOWN (HTTP {}) {message}", health.status())
    }
}

async fn run_leaderboard(client: &MatchClient, limit: usize) -> Result<()> {
    let entries = client.leaderboard().await?;
    if entries.is_empty() {
        println!("No players yet.");
        return Ok(());
    }
    println!("{:>3}  {:<32} {:>5} {:>7}", "#", "player", "won", "played");
    for (rank, entry) in entries.iter().take(limit).enumerate() {
        println!(
            "{:>3}  {:<32} {:>5} {:>7}",
            rank + 1,
            entry.username(),
            entry.games_won(),
            entry.games_played()
        );
    }
    Ok(())
}

/// Queue, then play the match until it is torn down or times out.
#[instrument(skip(client))]
async fn run_play(client: &MatchClient, name: Option<String>) -> Result<()> {
    let identity = match name {
        Some(name) => client.register(&name).await?.0,
        None => client
            .whoami()?
            .context("No username remembered; run `onevoneme register <name>` first")?,
    };

    println!("Queueing as {identity}. Press Ctrl-C to leave the queue.");
    let mut attempt = client.enter_queue(identity.clone());
    let assignment = loop {
        tokio::select! {
            event = attempt.next_event() => match event {
                Some(QueueEvent::Pending { attempt: n }) if n % 10 == 0 => {
                    println!("Still waiting for an opponent ({n} polls)...");
                }
                Some(QueueEvent::Pending { .. }) => {}
                Some(QueueEvent::Matched(assignment)) => break assignment,
                Some(QueueEvent::Failed(e)) => return Err(e.into()),
                None => anyhow::bail!("Queue attempt ended without a match"),
            },
            _ = tokio::signal::ctrl_c() => {
                attempt.cancel().await;
                println!("Left the queue.");
                return Ok(());
            }
        }
    };

    let game = assignment.game_type();
    println!(
        "Matched! Playing {game} against {}.",
        assignment.opponent().unwrap_or(client.config().default_opponent())
    );
    info!(%game, "Match started");

    let mut session = client.start_session(identity, assignment);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(event) => {
                    if !render(game, event) {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => match parse_move(game, &line) {
                    Some(mv) => match session.submit(mv).await {
                        Ok(SubmitOutcome::Accepted) => {}
                        Ok(SubmitOutcome::Ignored(reason)) => println!("({reason})"),
                        Err(e) => println!("Move failed: {e}"),
                    },
                    None => println!("{}", move_hint(game)),
                },
                None => break,
            },
        }
    }

    let summary = session.shutdown().await?;
    info!(?summary, "Session closed");
    println!("Back to the lobby.");
    Ok(())
}

/// Prints an event. Returns false once the session is over.
fn render(game: GameType, event: SessionEvent) -> bool {
    match event {
        SessionEvent::ViewUpdated(view) => print_view(&view),
        SessionEvent::PhaseChanged { to: Phase::MyTurn, .. } => {
            println!("Your turn. {}", move_hint(game));
        }
        SessionEvent::PhaseChanged { to: Phase::AwaitingOpponent, .. } => {
            println!("Waiting for opponent...");
        }
        SessionEvent::PhaseChanged { .. } => {}
        SessionEvent::Resolved { verdict, .. } => match verdict {
            Some(verdict) => println!("{verdict}!"),
            None => println!("Match over."),
        },
        SessionEvent::SubmissionRejected(e) => println!("Move rejected: {e}"),
        SessionEvent::TimedOut { error, .. } => {
            println!("Timed out: {error}.");
            return false;
        }
        SessionEvent::TornDown { reason } => {
            println!("Match closed ({reason}).");
            return false;
        }
    }
    true
}

fn print_view(view: &SessionView) {
    if let Some(board) = view.board() {
        println!("\n{}\n", board.display());
    }
    if let Some(round) = view.round() {
        let mine = round.choice_of(*view.my_slot());
        let theirs = round.choice_of(view.my_slot().opponent());
        println!(
            "You: {}  Opponent: {}",
            mine.map_or("-".to_string(), |c| c.to_string()),
            theirs.map_or("?".to_string(), |c| c.to_string())
        );
    }
    println!("{}", view.status_text());
}

fn move_hint(game: GameType) -> &'static str {
    match game {
        GameType::TicTacToe => "Enter a cell as `row col` (0-2 each).",
        GameType::RockPaperScissors => "Enter rock, paper or scissors.",
    }
}

/// Parses a line of player input for `game`.
fn parse_move(game: GameType, line: &str) -> Option<PlayerMove> {
    match game {
        GameType::TicTacToe => {
            let digits: Vec<u8> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .flat_map(|part| part.chars())
                .map(|c| c.to_digit(10).and_then(|d| u8::try_from(d).ok()))
                .collect::<Option<Vec<_>>>()?;
            match digits.as_slice() {
                [row, col] => Location::new(*row, *col).map(PlayerMove::Place),
                _ => None,
            }
        }
        GameType::RockPaperScissors => Choice::from_wire(line).map(PlayerMove::Throw),
    }
}
