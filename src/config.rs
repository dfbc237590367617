use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// FloodGuard client configuration.
///
/// The API base URL is the only required value and is a constructor
/// parameter. Everything else has a default and a `with_*` override.
///
/// ```rust,ignore
/// use floodguard_client::ClientConfig;
///
/// let config = ClientConfig::new("https://floodguard.example.com/api".parse()?)
///     .with_request_timeout(Duration::from_secs(5))
///     .with_credential_path("/var/lib/floodguard/credential.json");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_url: Url,
    pub(crate) request_timeout: Duration,
    pub(crate) geocoder_url: Url,
    pub(crate) credential_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL.parse().expect("valid default URL"))
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url: with_trailing_slash(api_url),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            geocoder_url: with_trailing_slash(
                DEFAULT_GEOCODER_URL.parse().expect("valid default URL"),
            ),
            credential_path: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `FLOODGUARD_API_URL`: API base URL (default `http://localhost:8080/api`)
    /// - `FLOODGUARD_REQUEST_TIMEOUT_SECS`: per-request timeout in seconds (default 10)
    /// - `FLOODGUARD_GEOCODER_URL`: Nominatim base URL
    /// - `FLOODGUARD_CREDENTIAL_PATH`: persist the credential to this file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_url = match lookup("FLOODGUARD_API_URL") {
            Some(s) => s
                .parse()
                .map_err(|e| Error::Config(format!("FLOODGUARD_API_URL: {e}")))?,
            None => DEFAULT_API_URL.parse().expect("valid default URL"),
        };

        let mut config = Self::new(api_url);

        if let Some(secs) = lookup("FLOODGUARD_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                Error::Config(format!("FLOODGUARD_REQUEST_TIMEOUT_SECS: {e}"))
            })?;
            if secs == 0 {
                return Err(Error::Config(
                    "FLOODGUARD_REQUEST_TIMEOUT_SECS must be positive".into(),
                ));
            }
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(url_str) = lookup("FLOODGUARD_GEOCODER_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("FLOODGUARD_GEOCODER_URL: {e}")))?;
            config = config.with_geocoder_url(url);
        }
        if let Some(path) = lookup("FLOODGUARD_CREDENTIAL_PATH").filter(|p| !p.is_empty()) {
            config = config.with_credential_path(path);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_geocoder_url(mut self, url: Url) -> Self {
        self.geocoder_url = with_trailing_slash(url);
        self
    }

    #[must_use]
    pub fn with_credential_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_path = Some(path.into());
        self
    }

    /// API base URL, always ending in `/`.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn geocoder_url(&self) -> &Url {
        &self.geocoder_url
    }

    #[must_use]
    pub fn credential_path(&self) -> Option<&PathBuf> {
        self.credential_path.as_ref()
    }

    /// HTTP client carrying the request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("floodguard-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Into::into)
    }
}

/// `Url::join` replaces the last segment unless the base ends with `/`.
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, Error> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
}
