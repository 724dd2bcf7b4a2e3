//! Credential exchange with the Fleet server.
//!
//! Fleet accepts two kinds of credentials:
//! - an API token (API-only user or a token copied from the UI), used as-is;
//! - an email/password pair, exchanged for a session token via `POST login`.
//!
//! After obtaining a token, [`fetch_current_user`] (`GET me`) confirms that
//! the server accepts it before the connection is handed to callers.

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Connection;
use crate::error::Result;

/// Credentials used to establish a connection.
#[derive(Clone)]
pub enum Credentials {
    /// A pre-issued API token.
    ApiToken(String),
    /// A user's login, exchanged for a session token.
    Password {
        /// Login email.
        email: String,
        /// Login password.
        password: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiToken(_) => f.write_str("ApiToken(<redacted>)"),
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// JSON body for `POST login`.
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Subset of the login response we need. Extra fields (available teams,
/// SSO settings) are ignored.
#[derive(Deserialize)]
pub struct LoginResponse {
    /// Session token to send as the bearer credential.
    pub token: String,
    /// The logged-in user, when the server includes it.
    #[serde(default)]
    pub user: Option<User>,
}

/// The authenticated Fleet user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Numeric user id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// `admin`, `maintainer`, `observer`, ... or `None` for team-scoped users.
    #[serde(default)]
    pub global_role: Option<String>,
    /// `true` for API-only users, which cannot log in to the UI.
    #[serde(default)]
    pub api_only: bool,
}

#[derive(Deserialize)]
struct MeResponse {
    user: User,
}

/// Turns credentials into a bearer token.
///
/// API tokens are returned unchanged; passwords go through `POST login` on
/// an unauthenticated connection that shares `http`'s cookie jar.
pub async fn obtain_token(http: &Client, base_url: &str, credentials: &Credentials) -> Result<String> {
    match credentials {
        Credentials::ApiToken(token) => Ok(token.clone()),
        Credentials::Password { email, password } => {
            let anonymous = Connection::with_client(http.clone(), base_url, None)?;
            let body = LoginRequest { email, password };
            let response: LoginResponse = anonymous.post("login", &body).await?;
            debug!(email = %email, "password login succeeded");
            Ok(response.token)
        }
    }
}

/// Fetches the user the connection is authenticated as.
pub async fn fetch_current_user(conn: &Connection) -> Result<User> {
    let me: MeResponse = conn.get("me").await?;
    Ok(me.user)
}

/// Invalidates the server-side session for this connection's token.
pub async fn logout(conn: &Connection) -> Result<()> {
    conn.execute(&crate::client::Request::post("logout")).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_serializes_as_json_object() {
        let req = LoginRequest {
            email: "admin@example.com",
            password: "hunter2",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["email"], "admin@example.com");
        assert_eq!(json["password"], "hunter2");
    }

    #[test]
    fn login_response_ignores_unknown_fields() {
        let json = r#"{
            "user": {"id": 1, "name": "Admin", "email": "admin@example.com", "global_role": "admin"},
            "available_teams": [],
            "token": "abc123"
        }"#;
        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.token, "abc123");
        assert_eq!(resp.user.unwrap().global_role.as_deref(), Some("admin"));
    }

    #[test]
    fn credentials_debug_never_prints_secrets() {
        let token = format!("{:?}", Credentials::ApiToken("s3cret".to_string()));
        let login = format!(
            "{:?}",
            Credentials::Password {
                email: "a@b.c".to_string(),
                password: "s3cret".to_string()
            }
        );
        assert!(!token.contains("s3cret"));
        assert!(!login.contains("s3cret"));
        assert!(login.contains("a@b.c"));
    }
}
