//! Backend health and the leaderboard.

use crate::api::GameApi;
use crate::error::ClientError;
use derive_getters::Getters;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Answer of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct BackendHealth {
    up: bool,
    status: u16,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireHealth {
    status: Option<String>,
    message: Option<String>,
}

/// Probes the backend.
///
/// A transport failure is an error; any status response is a health
/// report, `up` only for a 2xx whose body says `"status": "UP"`.
#[instrument(skip(api))]
pub async fn check_health(api: &dyn GameApi) -> Result<BackendHealth, ClientError> {
    let response = api.health().await?;
    let wire = serde_json::from_str::<WireHealth>(&response.body).ok();
    let reported_up = wire
        .as_ref()
        .and_then(|w| w.status.as_deref())
        .is_some_and(|s| s.eq_ignore_ascii_case("UP"));
    let message = wire.and_then(|w| w.message).or_else(|| {
        let body = response.body.trim();
        (!body.is_empty()).then(|| body.to_string())
    });
    debug!(status = response.status, reported_up, "Health checked");
    Ok(BackendHealth {
        up: response.is_success() && reported_up,
        status: response.status,
        message,
    })
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct LeaderboardEntry {
    username: String,
    games_won: u32,
    games_played: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    name: Option<String>,
    #[serde(default)]
    games_won: u32,
    #[serde(default)]
    games_played: u32,
}

/// Fetches registered players, most wins first, ties by username.
#[instrument(skip(api))]
pub async fn leaderboard(api: &dyn GameApi) -> Result<Vec<LeaderboardEntry>, ClientError> {
    let response = api.users().await?;
    if !response.is_success() {
        return Err(ClientError::transport(format!(
            "user list unavailable: HTTP {}",
            response.status
        )));
    }
    if response.body.trim().is_empty() || response.body.trim() == "null" {
        return Ok(Vec::new());
    }
    let users: HashMap<String, WireUser> = serde_json::from_str(&response.body)
        .map_err(|e| ClientError::transport(format!("unreadable user list: {}", e)))?;

    let mut entries: Vec<_> = users
        .into_iter()
        .map(|(key, user)| LeaderboardEntry {
            username: user.name.unwrap_or(key),
            games_won: user.games_won,
            games_played: user.games_played,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.games_won
            .cmp(&a.games_won)
            .then_with(|| a.username.cmp(&b.username))
    });
    debug!(players = entries.len(), "Leaderboard loaded");
    Ok(entries)
}
