//! Session holder: the bearer credential shared by every component.
//!
//! A [`SessionHolder`] is a cloneable handle. The root
//! [`SyncClient`](crate::client::SyncClient) owns the original and hands
//! clones to the components that authenticate requests. Nothing is
//! persisted; the session lives until [`SessionHolder::logout`] or until the
//! last handle is dropped.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::{AuthError, Error};

/// An authenticated user session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token for `Authorization` headers.
    pub token: String,
    /// Id of the authenticated user record.
    pub user_id: String,
    /// Email of the authenticated user.
    pub email: String,
    /// Display name of the authenticated user.
    pub display_name: String,
    /// When the login succeeded.
    pub authenticated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("authenticated_at", &self.authenticated_at)
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    identity: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    record: AuthRecord,
}

#[derive(Deserialize)]
struct AuthRecord {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Self {
            token: response.token,
            user_id: response.record.id,
            email: response.record.email,
            display_name: response.record.name,
            authenticated_at: Utc::now(),
        }
    }
}

/// Cloneable handle to the process's current session.
#[derive(Debug, Clone)]
pub struct SessionHolder {
    api: ApiClient,
    auth_collection: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl SessionHolder {
    /// Create an unauthenticated holder logging in against `auth_collection`.
    #[must_use]
    pub fn new(api: ApiClient, auth_collection: impl Into<String>) -> Self {
        Self {
            api,
            auth_collection: auth_collection.into(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Exchange credentials for a bearer token and hold the session.
    ///
    /// Any previously held session is dropped first, so a failed login
    /// leaves the holder unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for any status other than
    /// `200`, and [`AuthError::Transport`] if the request fails or the body
    /// cannot be decoded.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<Session, AuthError> {
        self.logout();

        let url = self.api.auth_url(&self.auth_collection);
        debug!(%url, identity, "Logging in");

        let response = self
            .api
            .request(Method::POST, url)
            .json(&PasswordGrant {
                identity,
                password: secret,
            })
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), identity, "Login rejected");
            return Err(AuthError::InvalidCredentials {
                status: status.as_u16(),
            });
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let session = Session::from(body);

        info!(user_id = %session.user_id, "Logged in");
        self.set(Some(session.clone()));
        Ok(session)
    }

    /// Drop the held session. No network call is made.
    pub fn logout(&self) {
        if self.set(None).is_some() {
            info!("Logged out");
        }
    }

    /// The current bearer token, if logged in.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.read(|session| session.map(|s| s.token.clone()))
    }

    /// A copy of the current session, if logged in.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.read(|session| session.cloned())
    }

    /// Check whether a session is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|session| session.is_some())
    }

    /// The current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] if nobody is logged in.
    pub fn require_token(&self) -> Result<String, Error> {
        self.current_token().ok_or(Error::NotAuthenticated)
    }

    fn read<R>(&self, f: impl FnOnce(Option<&Session>) -> R) -> R {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_ref())
    }

    fn set(&self, session: Option<Session>) -> Option<Session> {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, session)
    }

    #[cfg(test)]
    pub(crate) fn set_for_test(&self, token: &str) {
        self.set(Some(Session {
            token: token.to_string(),
            user_id: "u1".to_string(),
            email: "a@b.com".to_string(),
            display_name: "Tester".to_string(),
            authenticated_at: Utc::now(),
        }));
    }
}
