//! Transport seam between the engine and the backend.
//!
//! [`GameApi`] returns raw status and body; deciding what a body means is
//! left to the engine so scripted transports stay trivial.

use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use derive_new::new;
use onevoneme_games::{Choice, Location};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, instrument};

/// Raw HTTP result.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text (possibly empty).
    pub body: String,
}

impl ApiResponse {
    /// A 200 response with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body.into())
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Operations the backend exposes to a player client.
///
/// A `Transport` error means no status was received. Any status, including
/// 4xx and 5xx, comes back as `Ok(ApiResponse)`.
#[async_trait]
pub trait GameApi: Send + Sync + std::fmt::Debug {
    /// `POST /register/{username}`.
    async fn register(&self, username: &str) -> Result<ApiResponse, ClientError>;

    /// `POST /queue/{username}`: join the matchmaking queue.
    async fn join_queue(&self, username: &str) -> Result<ApiResponse, ClientError>;

    /// `GET /gamestate/{username}`: the player's current match snapshot.
    async fn fetch_snapshot(&self, username: &str) -> Result<ApiResponse, ClientError>;

    /// `POST /make_move/{game_id}/{username}` with `{username, location}`.
    async fn make_move(
        &self,
        game_id: &str,
        username: &str,
        location: Location,
    ) -> Result<ApiResponse, ClientError>;

    /// `POST /set_move/{game_id}` with `{username, choice}`.
    async fn set_choice(
        &self,
        game_id: &str,
        username: &str,
        choice: Choice,
    ) -> Result<ApiResponse, ClientError>;

    /// `GET /get_move/{game_id}/{opponent}`: the opponent's throw, if any.
    async fn fetch_opponent_choice(
        &self,
        game_id: &str,
        opponent: &str,
    ) -> Result<ApiResponse, ClientError>;

    /// `GET /health`.
    async fn health(&self) -> Result<ApiResponse, ClientError>;

    /// `GET /users`: registered players and their records.
    async fn users(&self) -> Result<ApiResponse, ClientError>;
}

#[derive(Debug, Serialize)]
struct MoveRequest<'a> {
    username: &'a str,
    location: [u8; 2],
}

#[derive(Debug, Serialize)]
struct ChoiceRequest<'a> {
    username: &'a str,
    choice: Choice,
}

/// [`GameApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpGameApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpGameApi {
    /// Creates a client for `config.base_url()` with the configured timeout.
    #[instrument(skip(config), fields(base_url = %config.base_url()))]
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.base_url())
            .map_err(|e| ClientError::transport(format!("invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::transport(format!(
                "base URL cannot carry a path: {}",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { base_url, client })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::transport("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read(response: reqwest::Response) -> Result<ApiResponse, ClientError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, len = body.len(), "Response received");
        Ok(ApiResponse::new(status, body))
    }

    async fn get(&self, segments: &[&str]) -> Result<ApiResponse, ClientError> {
        let url = self.url(segments)?;
        debug!(%url, "GET");
        Self::read(self.client.get(url).send().await?).await
    }

    async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(segments)?;
        debug!(%url, "POST");
        let request = self.client.post(url);
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        Self::read(request.send().await?).await
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    #[instrument(skip(self))]
    async fn register(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.post::<()>(&["register", username], None).await
    }

    #[instrument(skip(self))]
    async fn join_queue(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.post::<()>(&["queue", username], None).await
    }

    #[instrument(skip(self))]
    async fn fetch_snapshot(&self, username: &str) -> Result<ApiResponse, ClientError> {
        self.get(&["gamestate", username]).await
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn make_move(
        &self,
        game_id: &str,
        username: &str,
        location: Location,
    ) -> Result<ApiResponse, ClientError> {
        let body = MoveRequest {
            username,
            location: location.to_wire(),
        };
        self.post(&["make_move", game_id, username], Some(&body))
            .await
    }

    #[instrument(skip(self), fields(choice = %choice))]
    async fn set_choice(
        &self,
        game_id: &str,
        username: &str,
        choice: Choice,
    ) -> Result<ApiResponse, ClientError> {
        let body = ChoiceRequest { username, choice };
        self.post(&["set_move", game_id], Some(&body)).await
    }

    #[instrument(skip(self))]
    async fn fetch_opponent_choice(
        &self,
        game_id: &str,
        opponent: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.get(&["get_move", game_id, opponent]).await
    }

    #[instrument(skip(self))]
    async fn health(&self) -> Result<ApiResponse, ClientError> {
        self.get(&["health"]).await
    }

    #[instrument(skip(self))]
    async fn users(&self) -> Result<ApiResponse, ClientError> {
        self.get(&["users"]).await
    }
}
