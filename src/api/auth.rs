use serde::{Deserialize, Serialize};
use url::Url;

use super::error_from_response;
use crate::config::{endpoint, with_trailing_slash};
use crate::error::Error;

pub(crate) const LOGIN_FAILED: &str = "Login failed. Please try again.";
pub(crate) const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Account registration form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.into(),
            full_name: None,
            phone_number: None,
        }
    }

    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }
}

/// Response of `/auth/login` and `/auth/register`.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Unauthenticated `/auth/*` endpoints.
///
/// A rejected login is an ordinary failure here, not an authorization
/// failure of an existing session.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    base_url: Url,
}

impl AuthApi {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
        }
    }

    /// Exchange username and password for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Server`] with
    /// the server's message (or a generic one) if the login is refused.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, Error> {
        let response = self
            .http
            .post(endpoint(&self.base_url, "auth/login")?)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, LOGIN_FAILED).await);
        }
        response.json::<AuthResponse>().await.map_err(Into::into)
    }

    /// Create an account; the server answers with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Server`] with
    /// the server's message (or a generic one) if registration is refused.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, Error> {
        let response = self
            .http
            .post(endpoint(&self.base_url, "auth/register")?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, REGISTRATION_FAILED).await);
        }
        response.json::<AuthResponse>().await.map_err(Into::into)
    }
}
