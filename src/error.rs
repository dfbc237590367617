use crate::report::ValidationErrors;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The bearer credential could not be decoded into an identity.
    #[error("Credential decode error: {0}")]
    CredentialDecode(String),

    /// The server rejected the credential (HTTP 401/403).
    #[error("Please log in to continue (HTTP {status})")]
    Authorization { status: u16 },

    /// Client-side report validation failed.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Non-authorization failure reported by the server.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid location: latitude {latitude}, longitude {longitude}")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error("OAuth2 callback did not carry a token")]
    MissingCallbackToken,

    #[error("Geocoding error: {0}")]
    Geocode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this failure came from the server rejecting the credential.
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }

    /// HTTP status attached to the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authorization { status } | Self::Server { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
