//! FloodGuard REST API.
//!
//! Every authenticated call goes through [`ApiClient::send`], the single
//! outgoing request path: it attaches `Authorization: Bearer <token>` from the
//! session and classifies failures, so call sites never touch the credential.
//!
//! - 401/403: the session is told via
//!   [`SessionManager::on_authorization_failure_for`] and the caller gets
//!   [`Error::Authorization`].
//! - other non-success: [`Error::Server`] with the body's `message`, or a
//!   generic fallback.
//! - transport failures and timeouts: [`Error::Http`], never retried.

mod account;
mod admin;
mod auth;
mod reports;
mod weather;

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

pub use account::{PasswordChange, ProfileUpdate, UserProfile};
pub use auth::{AuthApi, AuthResponse, RegisterRequest};
pub use reports::DEFAULT_NEARBY_RADIUS;

use crate::config::{endpoint, with_trailing_slash};
use crate::error::Error;
use crate::location::LocationSelection;
use crate::poll::{DataKind, Fetcher, PollData};
use crate::session::SessionManager;

pub(crate) const GENERIC_FAILURE: &str = "An unexpected error occurred";

/// Error body shape used by the backend.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Authenticated client for the FloodGuard API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl ApiClient {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: Url, session: Arc<SessionManager>) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        Ok(self.http.get(endpoint(&self.base_url, path)?))
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        Ok(self.http.post(endpoint(&self.base_url, path)?))
    }

    fn put(&self, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        Ok(self.http.put(endpoint(&self.base_url, path)?))
    }

    /// Sends `request` with the session's bearer token and decodes the JSON
    /// response.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, Error> {
        let response = self.execute(request).await?;
        response.json::<T>().await.map_err(Into::into)
    }

    /// Like [`send`](Self::send) for endpoints whose body is not needed.
    async fn send_discarding(&self, request: reqwest::RequestBuilder) -> Result<(), Error> {
        self.execute(request).await.map(drop)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let token = self.session.token();
        let request = match token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), url = %response.url(), "Request not authorized");
            self.session.on_authorization_failure_for(token.as_deref());
            return Err(Error::Authorization {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(error_from_response(response, GENERIC_FAILURE).await);
        }
        Ok(response)
    }
}

impl Fetcher for ApiClient {
    async fn fetch(&self, kind: DataKind, location: LocationSelection) -> Result<PollData, Error> {
        match kind {
            DataKind::Weather => self.current_weather(&location).await.map(PollData::Weather),
            DataKind::FloodRisk => self.flood_risk(&location).await.map(PollData::FloodRisk),
            DataKind::Alerts => self.alerts_near(&location).await.map(PollData::Alerts),
            DataKind::ReportsFeed => self
                .reports(0, reports::FEED_PAGE_SIZE)
                .await
                .map(PollData::ReportsFeed),
        }
    }
}

/// Builds a [`Error::Server`] from a failed response, preferring the
/// server-provided `message`.
pub(crate) async fn error_from_response(response: reqwest::Response, fallback: &str) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned());

    tracing::warn!(status, message = %message, "API request failed");
    Error::Server { status, message }
}
