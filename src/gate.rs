use std::collections::HashSet;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tokio::sync::watch;

use crate::{
    AppState,
    auth::{AdminSession, AuthState, RevokedSessions, resolve_session, session_token},
    config::AppConfig,
    error::BackendError,
    models::SessionUser,
};

/// Where callers without an admin session are sent.
pub const LOGIN_ROUTE: &str = "/admin/login";
pub const DASHBOARD_ROUTE: &str = "/admin/dashboard";

/// AdminPolicy
///
/// The admin allow-list. Emails are compared trimmed and ASCII case-insensitively.
/// This only decides what the admin pages render; the backend's row-level
/// policies decide what a session may actually write.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: HashSet<String>,
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl AdminPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|email| normalize(email.as_ref()))
                .filter(|email| !email.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.admin_emails)
    }

    pub fn admits(&self, user: &SessionUser) -> bool {
        user.email
            .as_deref()
            .is_some_and(|email| self.emails.contains(&normalize(email)))
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

/// GateState
///
/// `Loading` until the session check settles, then one of the three outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Loading,
    Admin(SessionUser),
    NonAdmin(SessionUser),
    Unauthenticated,
}

/// GateDecision
///
/// What the admin subtree does for a given gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Show the blocking placeholder; never redirect while loading.
    Wait,
    Render,
    Redirect(&'static str),
}

impl GateState {
    /// Settles a session lookup against the policy.
    pub fn classify(session: Option<SessionUser>, policy: &AdminPolicy) -> Self {
        match session {
            Some(user) if policy.admits(&user) => GateState::Admin(user),
            Some(user) => GateState::NonAdmin(user),
            None => GateState::Unauthenticated,
        }
    }

    pub fn decision(&self) -> GateDecision {
        match self {
            GateState::Loading => GateDecision::Wait,
            GateState::Admin(_) => GateDecision::Render,
            GateState::NonAdmin(_) | GateState::Unauthenticated => GateDecision::Redirect(LOGIN_ROUTE),
        }
    }
}

/// SessionGate
///
/// Runs the session check for one mount of the admin subtree and publishes
/// its progress through a watch channel.
pub struct SessionGate {
    auth: AuthState,
    jwt_secret: Option<String>,
    policy: AdminPolicy,
    revoked: Option<RevokedSessions>,
    state: watch::Sender<GateState>,
}

impl SessionGate {
    pub fn new(auth: AuthState, jwt_secret: Option<String>, policy: AdminPolicy) -> Self {
        let (state, _) = watch::channel(GateState::Loading);
        Self {
            auth,
            jwt_secret,
            policy,
            revoked: None,
            state,
        }
    }

    /// Treats tokens signed out through this service as unauthenticated.
    pub fn with_revocations(mut self, revoked: RevokedSessions) -> Self {
        self.revoked = Some(revoked);
        self
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.auth.clone(),
            state.config.jwt_secret.clone(),
            state.policy.clone(),
        )
        .with_revocations(state.revoked.clone())
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Resolves `token` and classifies the caller. Lookup failures other than
    /// an unknown session are logged and treated as unauthenticated.
    pub async fn check(&self, token: Option<&str>) -> GateState {
        self.state.send_replace(GateState::Loading);

        let session = match token {
            None => None,
            Some(token) if self.revoked.as_ref().is_some_and(|r| r.is_revoked(token)) => {
                tracing::debug!("signed-out token presented");
                None
            }
            Some(token) => {
                match resolve_session(token, self.jwt_secret.as_deref(), self.auth.as_ref()).await {
                    Ok(user) => Some(user),
                    Err(BackendError::Unauthorized) => None,
                    Err(err) => {
                        tracing::warn!(error = %err, "session check failed");
                        None
                    }
                }
            }
        };

        let settled = GateState::classify(session, &self.policy);
        self.state.send_replace(settled.clone());
        settled
    }
}

/// admin_gate
///
/// Middleware for the protected admin routes. Admins pass through with an
/// `AdminSession` extension; everyone else gets a 303 to the login route, so
/// the gated handler never runs.
pub async fn admin_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = session_token(request.headers());
    let gate = SessionGate::from_state(&state);

    match (gate.check(token.as_deref()).await, token) {
        (GateState::Admin(user), Some(access_token)) => {
            request.extensions_mut().insert(AdminSession { user, access_token });
            next.run(request).await
        }
        (settled, _) => {
            tracing::info!(path = %request.uri().path(), state = ?settled, "admin gate refused");
            match settled.decision() {
                GateDecision::Redirect(to) => Redirect::to(to).into_response(),
                // check() never returns Loading or an admin without a token.
                GateDecision::Wait | GateDecision::Render => Redirect::to(LOGIN_ROUTE).into_response(),
            }
        }
    }
}
