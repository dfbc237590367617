//! Navigation gating.
//!
//! [`decide`] is a pure function of session status, role and requested path.
//! [`Navigator`] applies it on every navigation and every session transition.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::session::{SessionEvent, SessionManager, SessionStatus};
use crate::types::Role;

pub const LANDING_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const OAUTH2_CALLBACK_PATH: &str = "/oauth2/callback";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const REPORT_PATH: &str = "/report";
pub const ADMIN_PATH: &str = "/admin";

// Redirect chains are at most /admin -> /dashboard -> /login.
const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Landing,
    Login,
    Register,
    OAuth2Callback,
    Dashboard,
    Report,
    Admin,
}

impl Destination {
    /// Matches a path, ignoring any query string, fragment and trailing slash.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { LANDING_PATH } else { trimmed };
        match path {
            LANDING_PATH => Some(Self::Landing),
            LOGIN_PATH => Some(Self::Login),
            REGISTER_PATH => Some(Self::Register),
            OAUTH2_CALLBACK_PATH => Some(Self::OAuth2Callback),
            DASHBOARD_PATH => Some(Self::Dashboard),
            REPORT_PATH => Some(Self::Report),
            ADMIN_PATH => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => LANDING_PATH,
            Self::Login => LOGIN_PATH,
            Self::Register => REGISTER_PATH,
            Self::OAuth2Callback => OAUTH2_CALLBACK_PATH,
            Self::Dashboard => DASHBOARD_PATH,
            Self::Report => REPORT_PATH,
            Self::Admin => ADMIN_PATH,
        }
    }

    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Dashboard | Self::Report | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Session not resolved yet; show a neutral placeholder.
    Loading,
    Render(Destination),
    RedirectTo(Destination),
}

/// Decides whether `path` may be rendered for the given session.
#[must_use]
pub fn decide(status: SessionStatus, role: Option<&Role>, path: &str) -> Decision {
    if status == SessionStatus::Unknown {
        return Decision::Loading;
    }
    let authenticated = status.is_authenticated();

    let Some(destination) = Destination::from_path(path) else {
        return Decision::RedirectTo(Destination::Landing);
    };

    match destination {
        Destination::Login if authenticated => Decision::RedirectTo(Destination::Dashboard),
        d if !d.is_protected() => Decision::Render(d),
        _ if !authenticated => Decision::RedirectTo(Destination::Login),
        Destination::Admin if !role.is_some_and(Role::is_admin) => {
            Decision::RedirectTo(Destination::Dashboard)
        }
        d => Decision::Render(d),
    }
}

struct NavState {
    requested: String,
    decision: Decision,
}

/// Tracks the current location and keeps it consistent with the session.
pub struct Navigator {
    session: Arc<SessionManager>,
    state: Mutex<NavState>,
}

impl Navigator {
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            state: Mutex::new(NavState {
                requested: LANDING_PATH.to_owned(),
                decision: Decision::Loading,
            }),
        }
    }

    /// Navigates to `path`, following redirects until something renders or
    /// the session is still loading.
    pub fn navigate(&self, path: &str) -> Decision {
        let snapshot = self.session.snapshot();
        let mut requested = path.to_owned();
        let mut decision = decide(snapshot.status, snapshot.role(), &requested);

        for _ in 0..MAX_REDIRECTS {
            let Decision::RedirectTo(target) = decision else {
                break;
            };
            tracing::debug!(from = %requested, to = target.path(), "Redirecting");
            requested = target.path().to_owned();
            decision = decide(snapshot.status, snapshot.role(), &requested);
        }

        let mut state = self.state.lock();
        state.requested = requested;
        state.decision = decision;
        decision
    }

    /// Re-evaluates the current location against the latest session.
    pub fn sync(&self) -> Decision {
        let requested = self.state.lock().requested.clone();
        self.navigate(&requested)
    }

    /// Reacts to one session transition. A revoked authorization always lands
    /// on the login page; any other event re-checks the current location.
    pub fn handle(&self, event: &SessionEvent) -> Decision {
        match event {
            SessionEvent::AuthorizationRevoked => {
                tracing::info!("Forcing navigation to login");
                self.navigate(LOGIN_PATH)
            }
            SessionEvent::Initialized(_) | SessionEvent::SignedIn { .. } | SessionEvent::SignedOut => {
                self.sync()
            }
        }
    }

    /// Current path. While loading this is the path that was requested.
    #[must_use]
    pub fn location(&self) -> String {
        self.state.lock().requested.clone()
    }

    #[must_use]
    pub fn decision(&self) -> Decision {
        self.state.lock().decision
    }

    /// Applies every session event in a background task.
    ///
    /// The task holds the navigator weakly: it ends once the navigator is
    /// dropped, or when the session manager goes away.
    #[must_use]
    pub fn follow(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.session.events();
        let navigator = Arc::downgrade(&self);
        drop(self);

        tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(navigator) = navigator.upgrade() else {
                    tracing::debug!("Navigator dropped; no longer following session");
                    break;
                };
                match received {
                    Ok(event) => {
                        navigator.handle(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Session events lagged; resyncing");
                        navigator.sync();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
