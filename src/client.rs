//! Authenticated HTTP connection and request engine for the Fleet REST API.
//!
//! [`Connection`] wraps a pooled `reqwest::Client` (with cookie store), the
//! server base address, and the `Authorization` header value. Every request
//! in the crate goes through [`Connection::execute`], which:
//!
//! 1. Strips a leading `/` from the endpoint and prefixes [`API_PREFIX`].
//! 2. Appends percent-encoded query parameters.
//! 3. Sends the JSON body, if any, with the auth header attached.
//! 4. Routes transport failures and non-2xx responses to [`crate::classify`].
//! 5. For paginated GETs, walks `page=0,1,2,…` until the server's
//!    `meta.has_next_results` is false, concatenating the collection items.
//!
//! The typed helpers (`get`, `post`, `put`, `patch`, `delete`, `list`) are
//! thin wrappers that build a [`Request`] and decode the JSON result.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, trace};

use crate::classify::{classify_response, classify_transport};
use crate::error::{FleetError, Result};
use crate::params::QueryParams;

/// Fixed path prefix placed in front of every endpoint.
pub const API_PREFIX: &str = "api/latest/fleet";

/// Query parameter carrying the 0-based page index.
pub const PAGE_PARAM: &str = "page";

/// Collection field names Fleet uses in paginated list responses, checked in
/// this order before falling back to the first array-valued field.
const COLLECTION_FIELDS: &[&str] = &[
    "hosts",
    "policies",
    "queries",
    "software_titles",
    "software",
    "labels",
    "teams",
    "users",
    "packs",
    "scripts",
    "results",
];

/// Connect timeout (TCP + TLS handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout. Must outlast the server's live-query window,
/// since saved-query runs block until it closes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Transport settings for the pooled HTTP client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Maximum time to establish a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Maximum time for a whole request, including the response body.
    pub request_timeout: Duration,
    /// Skip TLS certificate verification (self-signed lab servers only).
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

/// Builds the pooled HTTP client shared by every request on a connection.
///
/// The cookie store keeps any session cookie the server sets alive across
/// calls, alongside the bearer header.
pub fn build_http_client(settings: &HttpSettings) -> Result<Client> {
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .cookie_store(true)
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .build()
        .map_err(|e| FleetError::Config(format!("failed to build HTTP client: {e}")))
}

// ── Request ──────────────────────────────────────────────────────────────

/// One logical API call. Built per call and never persisted.
#[derive(Debug, Clone)]
pub struct Request {
    /// Path relative to [`API_PREFIX`]; a leading `/` is tolerated.
    pub endpoint: String,
    /// HTTP verb.
    pub method: Method,
    /// JSON payload; `None` sends no body.
    pub body: Option<Value>,
    /// Query-string parameters, already normalized.
    pub query: QueryParams,
    /// Walk every page of a GET listing instead of returning the first response.
    pub follow_pagination: bool,
}

impl Request {
    /// A request with no body and no query parameters.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Request {
            endpoint: endpoint.into(),
            method,
            body: None,
            query: QueryParams::new(),
            follow_pagination: false,
        }
    }

    /// Shorthand for `Request::new(Method::GET, endpoint)`.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// Shorthand for a POST request.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// Shorthand for a PUT request.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    /// Shorthand for a PATCH request.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// Shorthand for a DELETE request.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Attaches a JSON body. Serialization failures surface as `InvalidRequest`.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| FleetError::InvalidRequest(format!("cannot encode request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Replaces the query parameters.
    pub fn query(mut self, params: QueryParams) -> Self {
        self.query = params;
        self
    }

    /// Requests transparent pagination. Only honored for GET.
    pub fn paginate(mut self) -> Self {
        self.follow_pagination = true;
        self
    }
}

// ── Pagination ───────────────────────────────────────────────────────────

/// One response interpreted as a batch of list results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Items from this page, in server order.
    pub items: Vec<Value>,
    /// `true` when `meta.has_next_results` says another page exists.
    pub has_more: bool,
}

impl Page {
    /// Interprets a response as a page. Anything that is not an object with
    /// a `meta` object is handed back unchanged as the complete answer.
    pub fn from_response(response: Value) -> std::result::Result<Page, Value> {
        let has_more = match response.get("meta") {
            Some(Value::Object(meta)) => meta
                .get("has_next_results")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => return Err(response),
        };
        Ok(Page {
            items: collection_items(response),
            has_more,
        })
    }
}

/// Pulls the list items out of a response of any shape.
///
/// Arrays are their own items; objects yield their collection field (see
/// [`COLLECTION_FIELDS`]); `null` yields nothing; any other scalar is a
/// single item.
pub fn collection_items(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Object(mut fields) => {
            let key = COLLECTION_FIELDS
                .iter()
                .find(|name| matches!(fields.get(**name), Some(Value::Array(_))))
                .map(|name| (*name).to_string())
                .or_else(|| {
                    fields
                        .iter()
                        .find(|(k, v)| k.as_str() != "meta" && v.is_array())
                        .map(|(k, _)| k.clone())
                });
            match key.and_then(|k| fields.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

// ── Connection ───────────────────────────────────────────────────────────

/// An established, authenticated link to one Fleet server.
///
/// Immutable once built. Cloning is cheap: the underlying `reqwest::Client`
/// shares its connection pool and cookie jar between clones.
#[derive(Clone)]
pub struct Connection {
    http: Client,
    base_url: String,
    auth_header: Option<String>,
    established_at: DateTime<Utc>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("auth_header", &self.auth_header.as_ref().map(|_| "<redacted>"))
            .field("established_at", &self.established_at)
            .finish()
    }
}

impl Connection {
    /// Creates a connection with a fresh default HTTP client and a bearer token.
    ///
    /// No request is made; use [`crate::session::Session::connect`] for the
    /// full login-and-verify flow. Tests use this to point at a mock server.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = build_http_client(&HttpSettings::default())?;
        Self::with_client(http, base_url, Some(token))
    }

    /// Creates a connection around an existing HTTP client.
    ///
    /// `token = None` yields an unauthenticated connection, used only for the
    /// login call itself.
    pub fn with_client(http: Client, base_url: &str, token: Option<&str>) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| FleetError::Config(format!("invalid server address '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FleetError::Config(format!(
                "server address must use http or https, got '{base_url}'"
            )));
        }
        Ok(Connection {
            http,
            base_url: trimmed.to_string(),
            auth_header: token.map(|t| format!("Bearer {t}")),
            established_at: Utc::now(),
        })
    }

    /// Server base address, without a trailing `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// When this connection was established.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// `true` when requests carry a bearer token.
    pub fn is_authenticated(&self) -> bool {
        self.auth_header.is_some()
    }

    /// Full URL for `endpoint` with `params` appended.
    pub fn url_for(&self, endpoint: &str, params: &QueryParams) -> String {
        let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);
        params.append_to(&format!("{}/{API_PREFIX}/{endpoint}", self.base_url))
    }

    /// Executes a request and returns the JSON result.
    ///
    /// With `follow_pagination` on a GET, the result is a JSON array holding
    /// every page's items in page order; otherwise it is the single raw
    /// response (`null` for an empty body).
    pub async fn execute(&self, request: &Request) -> Result<Value> {
        if request.follow_pagination && request.method == Method::GET {
            return self.execute_paginated(request).await;
        }
        self.send(request, &request.query).await
    }

    async fn execute_paginated(&self, request: &Request) -> Result<Value> {
        let mut items = Vec::new();
        let mut page: u32 = 0;

        loop {
            let query = request.query.clone().with(PAGE_PARAM, page.to_string());
            let response = self.send(request, &query).await?;
            match Page::from_response(response) {
                Ok(batch) => {
                    items.extend(batch.items);
                    if !batch.has_more {
                        break;
                    }
                    page += 1;
                }
                // Not a paginated object: the first response is the whole answer.
                Err(complete) if page == 0 => return Ok(complete),
                Err(tail) => {
                    items.extend(collection_items(tail));
                    break;
                }
            }
        }

        debug!(
            endpoint = %request.endpoint,
            pages = page + 1,
            items = items.len(),
            "pagination complete"
        );
        Ok(Value::Array(items))
    }

    /// Sends exactly one HTTP request.
    async fn send(&self, request: &Request, query: &QueryParams) -> Result<Value> {
        let url = self.url_for(&request.endpoint, query);
        debug!(method = %request.method, endpoint = %request.endpoint, page = query.get(PAGE_PARAM), "sending request");

        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(auth) = &self.auth_header {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        // Read the body before checking status so error messages survive.
        let text = response.text().await.map_err(classify_transport)?;
        trace!(%status, bytes = text.len(), "received response");

        if !status.is_success() {
            return Err(classify_response(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    // ── Typed helpers ────────────────────────────────────────────────────

    /// Executes a request and decodes the JSON result into `T`.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        let value = self.execute(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// GET without query parameters.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.execute_as(&Request::get(endpoint)).await
    }

    /// GET with query parameters, single page.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: QueryParams,
    ) -> Result<T> {
        self.execute_as(&Request::get(endpoint).query(params)).await
    }

    /// POSTs a JSON body and decodes the response.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_as(&Request::post(endpoint).json(body)?).await
    }

    /// PUTs a JSON body and decodes the response.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_as(&Request::put(endpoint).json(body)?).await
    }

    /// PATCHes a JSON body and decodes the response.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_as(&Request::patch(endpoint).json(body)?).await
    }

    /// DELETE, discarding any response body.
    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        self.execute(&Request::delete(endpoint)).await.map(|_| ())
    }

    /// Paginated GET decoded as a list of `T`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: QueryParams,
    ) -> Result<Vec<T>> {
        let request = Request::get(endpoint).query(params).paginate();
        let items = match self.execute(&request).await? {
            Value::Array(items) => items,
            other => collection_items(other),
        };
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(FleetError::from))
            .collect()
    }
}
