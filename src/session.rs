//! Connection lifecycle.
//!
//! A [`Session`] holds at most one live [`Connection`]. `connect` replaces it,
//! `disconnect` clears it, and every dependent call fails fast with
//! [`FleetError::NotConnected`] while it is empty.
//!
//! The slot stores an `Arc<Connection>` behind an async `RwLock`: callers
//! clone the `Arc` at the start of an operation, so a reconnect never changes
//! the connection underneath a request that is already in flight.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth::{self, Credentials};
use crate::client::{Connection, Request, build_http_client};
use crate::config::FleetConfig;
use crate::error::{FleetError, Result};

/// Holds at most one live connection; see the module docs.
#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<Live>>,
}

#[derive(Debug)]
struct Live {
    conn: Arc<Connection>,
    /// The token came from our own password login, so logout may revoke it.
    owns_token: bool,
}

impl Session {
    /// Creates a session with no connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session that already holds `conn`. Used by tests and by
    /// callers that build a [`Connection`] themselves.
    pub fn with_connection(conn: Connection) -> Self {
        Session {
            current: RwLock::new(Some(Live {
                conn: Arc::new(conn),
                owns_token: false,
            })),
        }
    }

    /// Logs in, verifies the token with `GET me`, and stores the connection.
    ///
    /// The previous connection, if any, is dropped first. On failure the
    /// session is left empty.
    pub async fn connect(&self, config: &FleetConfig) -> Result<Arc<Connection>> {
        let mut slot = self.current.write().await;
        *slot = None;

        let http = build_http_client(&config.http_settings())?;
        let credentials = config.credentials()?;
        let token = auth::obtain_token(&http, &config.url, &credentials).await?;
        let conn = Connection::with_client(http, &config.url, Some(&token))?;
        let user = auth::fetch_current_user(&conn).await?;

        info!(
            server = %conn.base_url(),
            user_id = user.id,
            email = user.email.as_deref().unwrap_or("-"),
            "connected to Fleet"
        );
        let conn = Arc::new(conn);
        *slot = Some(Live {
            conn: Arc::clone(&conn),
            owns_token: matches!(credentials, Credentials::Password { .. }),
        });
        Ok(conn)
    }

    /// Clears the connection. A token obtained by password login is also
    /// logged out server-side, best effort; a caller-supplied API token is
    /// left alone since logout would revoke it.
    ///
    /// Logout failures are logged, not returned: the local state is gone
    /// either way.
    pub async fn disconnect(&self) {
        let previous = self.current.write().await.take();
        let Some(Live { conn, owns_token }) = previous else {
            return;
        };
        if !owns_token {
            info!(server = %conn.base_url(), "disconnected from Fleet");
            return;
        }
        match auth::logout(&conn).await {
            Ok(()) => info!(server = %conn.base_url(), "disconnected from Fleet"),
            Err(err) => warn!(server = %conn.base_url(), error = %err, "logout failed; local session cleared anyway"),
        }
    }

    /// Returns the live connection or `NotConnected`.
    pub async fn connection(&self) -> Result<Arc<Connection>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|live| Arc::clone(&live.conn))
            .ok_or(FleetError::NotConnected)
    }

    /// `true` while a connection is held.
    pub async fn is_connected(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Executes `request` on the live connection. Fails with `NotConnected`
    /// before any I/O when there is none.
    pub async fn execute(&self, request: &Request) -> Result<Value> {
        let conn = self.connection().await?;
        conn.execute(request).await
    }
}
