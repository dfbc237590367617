use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, AuthApi};
use crate::config::ClientConfig;
use crate::credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::error::Error;
use crate::location::LocationWatcher;
use crate::poll::{PollScheduler, PollUpdate};
use crate::route::Navigator;
use crate::session::SessionManager;

/// The wired-up client: one session, one navigator and one location watcher
/// sharing a single HTTP connection pool.
pub struct FloodGuard {
    config: ClientConfig,
    http: reqwest::Client,
    session: Arc<SessionManager>,
    api: ApiClient,
    navigator: Arc<Navigator>,
    location: Arc<LocationWatcher>,
}

impl FloodGuard {
    /// Builds the client, persisting the credential to
    /// [`ClientConfig::credential_path`] when set and in memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let store: Arc<dyn CredentialStore> = match config.credential_path() {
            Some(path) => Arc::new(FileCredentialStore::new(path.clone())),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Self::with_store(config, store)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid environment values, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_store(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, Error> {
        let http = config.http_client()?;
        let auth = AuthApi::new(http.clone(), config.api_url().clone());
        let session = Arc::new(SessionManager::new(store, auth));
        let api = ApiClient::new(http.clone(), config.api_url().clone(), session.clone());
        let navigator = Arc::new(Navigator::new(session.clone()));

        tracing::debug!(api_url = %config.api_url(), "FloodGuard client configured");

        Ok(Self {
            config,
            http,
            session,
            api,
            navigator,
            location: Arc::new(LocationWatcher::new()),
        })
    }

    /// Resolves the persisted session and keeps the navigator in step with
    /// it. The returned task ends when aborted or once the client is dropped.
    #[must_use]
    pub fn start(&self) -> JoinHandle<()> {
        let task = self.navigator.clone().follow();
        let session = self.session.initialize();
        tracing::info!(status = ?session.status, "Session initialized");
        self.navigator.sync();
        task
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    #[must_use]
    pub fn location(&self) -> &Arc<LocationWatcher> {
        &self.location
    }

    /// A fresh scheduler for one consumer (a dashboard view, say). Drop it or
    /// call [`PollScheduler::teardown`] when the consumer goes away.
    #[must_use]
    pub fn poller(&self) -> (PollScheduler<ApiClient>, mpsc::UnboundedReceiver<PollUpdate>) {
        PollScheduler::new(Arc::new(self.api.clone()))
    }

    /// Place search against the configured Nominatim instance.
    #[must_use]
    pub fn geocoder(&self) -> crate::location::NominatimGeocoder {
        crate::location::NominatimGeocoder::new(self.http.clone(), self.config.geocoder_url().clone())
    }
}
