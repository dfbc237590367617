//! Authenticated-session state machine.
//!
//! ```text
//! Unknown ──initialize──▶ Anonymous | Authenticated | Expired
//! Anonymous/Expired ──login/register/OAuth callback──▶ Authenticated
//! Authenticated ──logout/authorization failure──▶ Anonymous
//! ```
//!
//! The manager owns the credential. It is shared by `Arc` with the request
//! layer (which reads the token and reports 401/403) and with the
//! [`Navigator`](crate::route::Navigator) (which reacts to [`SessionEvent`]s).
//! The credential store is only touched while the state lock is held, so a
//! logout racing an authorization failure always ends `Anonymous` with an
//! empty store.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use url::Url;

use crate::api::{AuthApi, AuthResponse, RegisterRequest};
use crate::credential::CredentialStore;
use crate::error::Error;
use crate::token::{Identity, decode_identity};
use crate::types::Role;

const EVENT_CAPACITY: usize = 16;

/// Where the session stands. Only `Authenticated` holds a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// Persisted credential not checked yet.
    #[default]
    Unknown,
    Anonymous,
    Authenticated,
    /// The persisted credential had passed its `exp` claim.
    Expired,
}

impl SessionStatus {
    /// Whether a decoded, unexpired credential is held.
    #[must_use]
    pub fn is_authenticated(self) -> bool {
        self == Self::Authenticated
    }
}

/// Session transitions, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `initialize()` resolved the persisted credential.
    Initialized(SessionStatus),
    SignedIn { username: String },
    /// User-initiated logout.
    SignedOut,
    /// The server rejected the credential; navigation must go to login.
    AuthorizationRevoked,
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
}

/// The `{user, role, isAuthenticated}` projection consumed by views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub user: Option<Identity>,
    pub role: Option<Role>,
    pub is_authenticated: bool,
}

impl Session {
    /// Role of the signed-in user.
    #[must_use]
    pub fn role(&self) -> Option<&Role> {
        self.identity.as_ref().map(|i| &i.role)
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            user: self.identity.clone(),
            role: self.role().cloned(),
            is_authenticated: self.status.is_authenticated(),
        }
    }
}

#[derive(Default)]
struct SessionState {
    status: SessionStatus,
    credential: Option<String>,
    identity: Option<Identity>,
}

/// Owner of the bearer credential and the session state machine.
///
/// Share it by `Arc` with [`ApiClient`](crate::api::ApiClient) and
/// [`Navigator`](crate::route::Navigator).
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    auth: AuthApi,
    state: RwLock<SessionState>,
    status_tx: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// A manager in `Unknown` state. Call [`initialize`](Self::initialize)
    /// before trusting any decision based on it.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, auth: AuthApi) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Unknown);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            auth,
            state: RwLock::new(SessionState::default()),
            status_tx,
            events,
        }
    }

    /// Resolves the persisted credential. Only the first call reads the
    /// store; later calls return the current snapshot.
    pub fn initialize(&self) -> Session {
        let mut state = self.state.write();
        if state.status != SessionStatus::Unknown {
            return snapshot(&state);
        }

        let status = match self.store.read().filter(|t| !t.trim().is_empty()) {
            None => {
                self.store.clear();
                SessionStatus::Anonymous
            }
            Some(token) => match decode_identity(&token) {
                Ok(identity) if identity.is_expired() => {
                    tracing::info!(username = %identity.username, "Stored credential has expired");
                    self.store.clear();
                    SessionStatus::Expired
                }
                Ok(identity) => {
                    tracing::info!(username = %identity.username, role = %identity.role, "Session restored");
                    state.credential = Some(token);
                    state.identity = Some(identity);
                    SessionStatus::Authenticated
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding undecodable stored credential");
                    self.store.clear();
                    SessionStatus::Anonymous
                }
            },
        };

        state.status = status;
        self.status_tx.send_replace(status);
        let _ = self.events.send(SessionEvent::Initialized(status));
        snapshot(&state)
    }

    /// Sign in with username and password.
    ///
    /// # Errors
    ///
    /// On failure the session is left unchanged and the error is returned:
    /// [`Error::Server`] with the server's message (or `"Login failed. Please
    /// try again."`), [`Error::Http`] on network failure, or
    /// [`Error::CredentialDecode`] if the issued token is unreadable.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, Error> {
        let response = self.auth.login(username, password).await?;
        self.establish_from(response)
    }

    /// Create an account and sign in with the issued token.
    ///
    /// # Errors
    ///
    /// As for [`login`](Self::login), with `"Registration failed. Please try
    /// again."` as the fallback message.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Identity, Error> {
        let response = self.auth.register(request).await?;
        self.establish_from(response)
    }

    /// Completes an OAuth2 login from the identity provider's redirect, which
    /// carries the token in its `token` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCallbackToken`] if the redirect has no token
    /// (the caller should send the user to login), or
    /// [`Error::CredentialDecode`] if the token is unreadable.
    pub fn complete_oauth2(&self, callback: &Url) -> Result<Identity, Error> {
        let mut token = None;
        for (key, value) in callback.query_pairs() {
            match key.as_ref() {
                "token" if !value.is_empty() => token = Some(value.into_owned()),
                "error" => {
                    tracing::warn!(error = %value, "OAuth2 error from identity provider");
                }
                _ => {}
            }
        }
        let token = token.ok_or(Error::MissingCallbackToken)?;
        self.establish(token)
    }

    /// Same as [`complete_oauth2`](Self::complete_oauth2) for an already
    /// extracted token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCallbackToken`] for an empty token, or
    /// [`Error::CredentialDecode`] if it is unreadable.
    pub fn complete_oauth2_token(&self, token: &str) -> Result<Identity, Error> {
        if token.trim().is_empty() {
            return Err(Error::MissingCallbackToken);
        }
        self.establish(token.to_owned())
    }

    /// Clears the credential and goes `Anonymous`. Cannot fail.
    pub fn logout(&self) {
        if self.clear_if(|_| true, SessionEvent::SignedOut) {
            tracing::info!("Signed out");
        }
    }

    /// Called by the request layer when the server answers 401/403.
    ///
    /// Same transition as [`logout`](Self::logout), announced as
    /// [`SessionEvent::AuthorizationRevoked`]. Idempotent: when no session is
    /// active nothing is announced. Returns whether a session was revoked.
    pub fn on_authorization_failure(&self) -> bool {
        self.revoke(None)
    }

    /// Like [`on_authorization_failure`](Self::on_authorization_failure), but
    /// ignored when the rejected request carried a credential that has since
    /// been replaced by a newer sign-in.
    pub fn on_authorization_failure_for(&self, sent: Option<&str>) -> bool {
        self.revoke(sent)
    }

    /// Status and identity, read together.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        snapshot(&self.state.read())
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        self.snapshot().view()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.read().identity.clone()
    }

    /// Admin predicate: authenticated with role `"ADMIN"`.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        let state = self.state.read();
        state.status.is_authenticated() && state.identity.as_ref().is_some_and(Identity::is_admin)
    }

    /// Bearer token to attach to outgoing requests.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.read().credential.clone()
    }

    /// Latest status, updated on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Feed of [`SessionEvent`]s from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Signs in with a token issued by `/auth/login` or `/auth/register`.
    /// Profile fields of the response fill claims the token lacks; the
    /// token's role is authoritative.
    fn establish_from(&self, response: AuthResponse) -> Result<Identity, Error> {
        let AuthResponse {
            token,
            email,
            name,
            role,
            ..
        } = response;
        let mut identity = decode_identity(&token)?;
        if let Some(role) = role.filter(|r| *r != identity.role.as_str()) {
            tracing::warn!(token_role = %identity.role, response_role = %role, "Role mismatch; using the credential's role");
        }
        identity.display_name = identity.display_name.or(name);
        identity.email = identity.email.or(email);
        self.establish_identity(token, identity)
    }

    fn establish(&self, token: String) -> Result<Identity, Error> {
        let identity = decode_identity(&token)?;
        self.establish_identity(token, identity)
    }

    fn establish_identity(&self, token: String, identity: Identity) -> Result<Identity, Error> {
        if identity.is_expired() {
            return Err(Error::CredentialDecode("credential has already expired".into()));
        }

        let mut state = self.state.write();
        self.store.save(&token);
        state.status = SessionStatus::Authenticated;
        state.credential = Some(token);
        state.identity = Some(identity.clone());
        self.status_tx.send_replace(SessionStatus::Authenticated);
        let _ = self.events.send(SessionEvent::SignedIn {
            username: identity.username.clone(),
        });
        drop(state);

        tracing::info!(username = %identity.username, role = %identity.role, "Signed in");
        Ok(identity)
    }

    /// Revocation after a 401/403. With `sent`, a credential that has been
    /// replaced since the request went out is left alone. The comparison and
    /// the clear happen under one write lock.
    fn revoke(&self, sent: Option<&str>) -> bool {
        let revoked = self.clear_if(
            |state| {
                let superseded = sent.is_some_and(|sent| {
                    state.credential.as_deref().is_some_and(|current| current != sent)
                });
                if superseded {
                    tracing::debug!("Ignoring authorization failure for a superseded credential");
                }
                !superseded
            },
            SessionEvent::AuthorizationRevoked,
        );
        if revoked {
            tracing::warn!("Session revoked after authorization failure");
        }
        revoked
    }

    /// Goes `Anonymous` and clears the store if `applies` holds for the
    /// current state, announcing `event` when a session was active. Returns
    /// whether a session was active.
    fn clear_if(&self, applies: impl FnOnce(&SessionState) -> bool, event: SessionEvent) -> bool {
        let mut state = self.state.write();
        if !applies(&state) {
            return false;
        }
        self.store.clear();
        let was_active = state.status.is_authenticated();
        state.status = SessionStatus::Anonymous;
        state.credential = None;
        state.identity = None;
        self.status_tx.send_replace(SessionStatus::Anonymous);
        if was_active {
            let _ = self.events.send(event);
        }
        was_active
    }
}

fn snapshot(state: &SessionState) -> Session {
    Session {
        status: state.status,
        identity: state.identity.clone(),
    }
}
