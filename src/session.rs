//! Session store: who is logged in, and whether we know yet.

use crate::error::ApiError;
use crate::http::{SecureClient, LOGIN_PATH, LOGOUT_PATH, ME_PATH, REGISTER_PATH};
use crate::models::{Credentials, Registration, User};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Verification has not finished; nothing should render yet
    Loading,
    Authenticated,
    Anonymous,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Loading => "loading",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Anonymous => "anonymous",
        }
    }
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    user: Option<User>,
}

/// Shared identity cell.
///
/// The session store writes it; the request wrapper clears it when a
/// refresh fails. Clones share the same state.
#[derive(Debug, Clone)]
pub struct SessionCell {
    inner: Arc<Mutex<SessionState>>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                phase: SessionPhase::Loading,
                user: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn set_loading(&self) {
        self.lock().phase = SessionPhase::Loading;
    }

    /// Store the verified identity (or its absence) and leave the loading state
    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.lock();
        state.phase = if user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        };
        state.user = user;
    }

    pub fn clear(&self) {
        self.set_user(None);
    }
}

pub struct SessionStore {
    client: Arc<SecureClient>,
    cell: SessionCell,
}

impl SessionStore {
    pub fn new(client: Arc<SecureClient>) -> Self {
        let cell = client.session().clone();
        Self { client, cell }
    }

    pub fn phase(&self) -> SessionPhase {
        self.cell.phase()
    }

    pub fn user(&self) -> Option<User> {
        self.cell.user()
    }

    /// The logged-in user, or `NotAuthenticated`
    pub fn require_user(&self) -> Result<User, ApiError> {
        self.cell.user().ok_or(ApiError::NotAuthenticated)
    }

    /// The logged-in user, provided the school has verified the account
    pub fn require_verified(&self) -> Result<User, ApiError> {
        let user = self.require_user()?;
        if user.is_verified {
            Ok(user)
        } else {
            Err(ApiError::NotVerified)
        }
    }

    /// False while verification is in progress; callers hold back content
    pub fn is_ready(&self) -> bool {
        self.cell.phase() != SessionPhase::Loading
    }

    /// Ask the server who we are. Any failure leaves the session anonymous.
    pub fn verify(&self) -> Option<User> {
        let user = match self.client.get(ME_PATH) {
            Ok(response) if response.is_ok() => match response.json::<User>() {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "could not decode current user");
                    None
                }
            },
            Ok(response) => {
                debug!(status = response.status, "no active session");
                None
            }
            Err(e) => {
                debug!(error = %e, "session verification failed");
                None
            }
        };
        self.cell.set_user(user.clone());
        user
    }

    /// Log in, then re-verify. A rejected attempt still re-verifies, so an
    /// existing session survives a failed login.
    pub fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let body = serde_json::to_value(credentials).map_err(|e| ApiError::Decode(e.to_string()))?;
        let previous = self.cell.user();
        self.cell.set_loading();

        let response = match self.client.post(LOGIN_PATH, Some(body)) {
            Ok(response) => response,
            // A rejected login surfaces as 401; the refresh that follows cannot help.
            // The client has already dropped the session.
            Err(ApiError::SessionExpired) => {
                return Err(ApiError::Status {
                    code: 401,
                    message: "Invalid username or password".to_string(),
                });
            }
            Err(e) => {
                self.cell.set_user(previous);
                return Err(e);
            }
        };
        if !response.is_ok() {
            self.verify();
            return Err(response.into_error("Login failed"));
        }

        match self.verify() {
            Some(user) => {
                info!(username = %user.username, role = user.role.as_str(), "logged in");
                Ok(user)
            }
            None => Err(ApiError::NotAuthenticated),
        }
    }

    /// End the session. The server call is best-effort; local state is
    /// always cleared.
    pub fn logout(&self) {
        match self.client.post(LOGOUT_PATH, None) {
            Ok(response) if !response.is_ok() => {
                warn!(status = response.status, "logout rejected by server")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "logout request failed"),
        }
        self.cell.clear();
        info!("logged out");
    }

    /// Create a student account. Does not log in.
    pub fn register(&self, registration: &Registration) -> Result<User, ApiError> {
        registration.validate()?;
        let body =
            serde_json::to_value(registration).map_err(|e| ApiError::Decode(e.to_string()))?;
        let response = self.client.post(REGISTER_PATH, Some(body))?;
        if !response.is_ok() {
            return Err(response.into_error("Registration failed"));
        }
        let user = response.json::<User>()?;
        info!(username = %user.username, "registered");
        Ok(user)
    }
}
