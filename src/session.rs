//! Authenticated-user state.
//!
//! The session is an explicit value owned by the caller. It starts in
//! `Loading`, settles into `Authenticated` or `Anonymous` once `resolve`
//! has consulted the persisted snapshot and the backend, and moves between
//! the two on login and logout.

use crate::api::{ApiError, RequestOptions, Role, Transport, User};
use crate::db::Database;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const USER_STORAGE_KEY: &str = "user";
pub const COOKIE_STORAGE_KEY: &str = "session_cookie";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Authenticated(User),
    Anonymous,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Local store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Corrupt session snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Not logged in. Run `login` first.")]
    NotAuthenticated,
    #[error("This command requires an admin account")]
    Forbidden,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    email: &'a str,
    full_name: &'a str,
    password: &'a str,
    confirm_password: &'a str,
}

#[derive(Serialize)]
struct ProfileUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fullname: Option<&'a str>,
}

/// `/register` answers `{user, token}`; older deployments return the bare user.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegisterResponse {
    Wrapped { user: User },
    Bare(User),
}

impl RegisterResponse {
    fn into_user(self) -> User {
        match self {
            RegisterResponse::Wrapped { user } | RegisterResponse::Bare(user) => user,
        }
    }
}

pub struct Session<'a> {
    transport: &'a Transport,
    db: &'a Database,
    state: SessionState,
}

impl<'a> Session<'a> {
    pub fn new(transport: &'a Transport, db: &'a Database) -> Self {
        Self {
            transport,
            db,
            state: SessionState::Loading,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.current_user()
            .is_some_and(|user| user.role == Role::Admin)
    }

    pub fn require_user(&self) -> Result<&User, SessionError> {
        self.current_user().ok_or(SessionError::NotAuthenticated)
    }

    pub fn require_admin(&self) -> Result<&User, SessionError> {
        let user = self.require_user()?;
        if user.role != Role::Admin {
            return Err(SessionError::Forbidden);
        }
        Ok(user)
    }

    /// Settle the session from persisted state. With a cached user the
    /// backend is asked who the cookie belongs to; any failure there drops
    /// the local session instead of trusting a stale snapshot.
    pub async fn resolve(&mut self) -> Result<&SessionState, SessionError> {
        if let Some(cookie) = self.db.get_item(COOKIE_STORAGE_KEY)? {
            self.transport.restore_cookies(&cookie);
        }

        let Some(raw) = self.db.get_item(USER_STORAGE_KEY)? else {
            debug!("No cached user, session is anonymous");
            self.state = SessionState::Anonymous;
            return Ok(&self.state);
        };
        if let Err(e) = serde_json::from_str::<User>(&raw) {
            warn!(error = %e, "Cached user is unreadable, clearing session");
            self.clear_local()?;
            return Ok(&self.state);
        }

        match self
            .transport
            .get::<User>("/user/me", RequestOptions::default())
            .await
        {
            Ok(user) => {
                debug!(user_id = %user.id, "Session confirmed");
                self.persist(user)?;
            }
            Err(e) => {
                warn!(error = %e, "Could not confirm session, clearing cached user");
                self.clear_local()?;
            }
        }
        Ok(&self.state)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&User, SessionError> {
        let user: User = self
            .transport
            .post(
                "/login",
                &LoginRequest { email, password },
                RequestOptions::default(),
            )
            .await?;
        info!(user_id = %user.id, "Logged in");
        self.persist(user)?;
        self.require_user()
    }

    pub async fn register(
        &mut self,
        email: &str,
        full_name: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<&User, SessionError> {
        let resp: RegisterResponse = self
            .transport
            .post(
                "/register",
                &RegisterRequest {
                    email,
                    full_name,
                    password,
                    confirm_password,
                },
                RequestOptions::default(),
            )
            .await?;
        let user = resp.into_user();
        info!(user_id = %user.id, "Registered");
        self.persist(user)?;
        self.require_user()
    }

    /// Ends the session server-side, then locally. Local state is cleared
    /// even when the backend call fails; that failure is still reported.
    pub async fn logout(&mut self) -> Result<(), SessionError> {
        let result = self
            .transport
            .delete::<serde_json::Value>("/user/logout", RequestOptions::default())
            .await;
        self.clear_local()?;
        match result {
            Ok(_) => {
                info!("Logged out");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_profile(
        &mut self,
        email: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<&User, SessionError> {
        self.require_user()?;
        let user: User = self
            .transport
            .put(
                "/user/profile",
                &ProfileUpdate {
                    email,
                    fullname: full_name,
                },
                RequestOptions::default(),
            )
            .await?;
        self.persist(user)?;
        self.require_user()
    }

    fn persist(&mut self, user: User) -> Result<(), SessionError> {
        self.db
            .set_item(USER_STORAGE_KEY, &serde_json::to_string(&user)?)?;
        if let Some(cookie) = self.transport.cookie_header() {
            self.db.set_item(COOKIE_STORAGE_KEY, &cookie)?;
        }
        self.state = SessionState::Authenticated(user);
        Ok(())
    }

    fn clear_local(&mut self) -> Result<(), SessionError> {
        self.db.remove_item(USER_STORAGE_KEY)?;
        self.db.remove_item(COOKIE_STORAGE_KEY)?;
        self.transport.clear_cookies();
        self.state = SessionState::Anonymous;
        Ok(())
    }
}
