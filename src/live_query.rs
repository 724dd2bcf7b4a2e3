//! Live query execution against explicit hosts.
//!
//! Two direct paths and one dispatcher:
//!
//! - [`run_saved_query`]: one blocking `POST queries/{id}/run`. The server
//!   waits out its own live-query window before replying; nothing is polled.
//! - [`run_adhoc_query`]: wraps raw SQL in a [`TemporaryQuery`], runs it via
//!   the saved path, and always deletes the temporary query afterwards.
//! - [`run_query`]: chooses between the direct paths and a campaign
//!   ([`crate::campaign`]) based on the targets and options.
//!
//! Per-host failures are data, not errors: they land in
//! [`QueryRunResult::per_host_errors`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::campaign::{CampaignOutcome, PollConfig, run_campaign};
use crate::client::Connection;
use crate::error::{FleetError, Result};
use crate::queries::{self, CreateQueryRequest};
use crate::results::{
    HostError, HostRows, RawHostResult, null_as_default, partition, response_rate,
};

/// Name prefix for temporary queries; makes strays easy to spot in the UI.
pub const TEMPORARY_QUERY_PREFIX: &str = "fleet-api-adhoc";

// ── Inputs ───────────────────────────────────────────────────────────────

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// Raw SQL text.
    Sql(String),
    /// Id of an existing saved query.
    Saved(u64),
}

/// Who to run it on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTargets {
    /// Host ids to target.
    pub hosts: Vec<u64>,
    /// Label ids to target; every member host is included.
    pub labels: Vec<u64>,
}

impl QueryTargets {
    /// Targets only the given hosts.
    pub fn hosts(hosts: impl IntoIterator<Item = u64>) -> Self {
        QueryTargets {
            hosts: hosts.into_iter().collect(),
            labels: Vec::new(),
        }
    }

    /// Targets only the given labels.
    pub fn labels(labels: impl IntoIterator<Item = u64>) -> Self {
        QueryTargets {
            hosts: Vec::new(),
            labels: labels.into_iter().collect(),
        }
    }

    /// `true` when neither hosts nor labels are set.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.labels.is_empty()
    }
}

/// How to run it.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Prefer the direct, server-blocking run when targets are plain hosts.
    pub synchronous: bool,
    /// Campaign mode only: wait with this polling policy, or return as soon
    /// as the campaign starts when `None`.
    pub poll: Option<PollConfig>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            synchronous: true,
            poll: Some(PollConfig::default()),
        }
    }
}

// ── Outputs ──────────────────────────────────────────────────────────────

/// Outcome of a direct run.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRunResult {
    /// The query that ran (the temporary one for ad-hoc runs).
    pub query_id: u64,
    /// Hosts the server sent the query to.
    pub targeted_host_count: u64,
    /// Hosts that answered before the live-query window closed.
    pub responded_host_count: u64,
    /// Percentage of targeted hosts that responded, two decimals.
    pub response_rate: f64,
    /// Hosts that returned rows.
    pub per_host_results: Vec<HostRows>,
    /// Hosts that reported an error.
    pub per_host_errors: Vec<HostError>,
}

/// Outcome of [`run_query`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum QueryExecution {
    /// A direct, server-blocking run.
    Direct(QueryRunResult),
    /// A campaign run.
    Campaign(CampaignOutcome),
}

#[derive(Serialize)]
struct RunSavedBody<'a> {
    host_ids: &'a [u64],
}

#[derive(Deserialize)]
struct RunSavedResponse {
    #[serde(default)]
    query_id: Option<u64>,
    #[serde(default, alias = "targeted")]
    targeted_host_count: u64,
    #[serde(default, alias = "responded")]
    responded_host_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<RawHostResult>,
}

// ── Temporary query guard ────────────────────────────────────────────────

/// A saved query that exists only for one ad-hoc run.
///
/// Call [`cleanup`](Self::cleanup) when done; it deletes the query exactly
/// once. If the guard is dropped without cleanup (a panic, or the caller
/// dropping the future mid-run), `Drop` spawns the delete on the current
/// tokio runtime instead.
pub struct TemporaryQuery {
    conn: Connection,
    id: u64,
    name: String,
    cleaned: bool,
}

impl TemporaryQuery {
    /// Creates the query on the server under a fresh unique name.
    pub async fn create(conn: &Connection, sql: &str) -> Result<Self> {
        let name = temporary_query_name();
        let request = CreateQueryRequest {
            name: name.clone(),
            query: sql.to_string(),
            description: Some("Temporary query created for a single live run".to_string()),
            observer_can_run: false,
            ..Default::default()
        };
        let query = queries::create_query(conn, &request).await?;
        debug!(query_id = query.id, name = %name, "temporary query created");
        Ok(TemporaryQuery {
            conn: conn.clone(),
            id: query.id,
            name,
            cleaned: false,
        })
    }

    /// Server id of the temporary query.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Generated name of the temporary query.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deletes the query. `NotFound` counts as already deleted; any other
    /// failure is logged and swallowed.
    ///
    /// If this future is dropped mid-delete, the guard is dropped with it
    /// and `Drop` sends the delete again in the background.
    pub async fn cleanup(mut self) {
        delete_temporary_query(&self.conn, self.id).await;
        self.cleaned = true;
    }
}

impl Drop for TemporaryQuery {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(query_id = id, "temporary query dropped before cleanup; deleting in background");
                let conn = self.conn.clone();
                handle.spawn(async move { delete_temporary_query(&conn, id).await });
            }
            Err(_) => warn!(
                query_id = id,
                name = %self.name,
                "temporary query dropped outside a runtime; delete it manually"
            ),
        }
    }
}

async fn delete_temporary_query(conn: &Connection, query_id: u64) {
    match queries::delete_query_by_id(conn, query_id).await {
        Ok(()) => debug!(query_id, "temporary query deleted"),
        Err(err) if err.is_not_found() => debug!(query_id, "temporary query already gone"),
        Err(err) => warn!(query_id, error = %err, "failed to delete temporary query"),
    }
}

/// `fleet-api-adhoc-<UTC timestamp>-<8 hex>`; unique across concurrent runs.
fn temporary_query_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{TEMPORARY_QUERY_PREFIX}-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

// ── Operations ───────────────────────────────────────────────────────────

/// Runs a saved query on `host_ids` and waits for the server's answer.
///
/// # Errors
///
/// - `FleetError::NoTargets`: `host_ids` is empty (no request is sent).
/// - Any classified error from the run request.
pub async fn run_saved_query(
    conn: &Connection,
    query_id: u64,
    host_ids: &[u64],
) -> Result<QueryRunResult> {
    if host_ids.is_empty() {
        return Err(FleetError::NoTargets);
    }

    let response: RunSavedResponse = conn
        .post(&format!("queries/{query_id}/run"), &RunSavedBody { host_ids })
        .await?;

    let (per_host_results, per_host_errors) = partition(response.results);
    let result = QueryRunResult {
        query_id: response.query_id.unwrap_or(query_id),
        targeted_host_count: response.targeted_host_count,
        responded_host_count: response.responded_host_count,
        response_rate: response_rate(response.targeted_host_count, response.responded_host_count),
        per_host_results,
        per_host_errors,
    };
    info!(
        query_id,
        targeted = result.targeted_host_count,
        responded = result.responded_host_count,
        errors = result.per_host_errors.len(),
        "saved query run finished"
    );
    Ok(result)
}

/// Runs raw SQL on `host_ids` through a temporary saved query.
///
/// The temporary query is deleted before this returns, whether the run
/// succeeded or failed; cleanup problems never replace the run's outcome.
pub async fn run_adhoc_query(
    conn: &Connection,
    sql: &str,
    host_ids: &[u64],
) -> Result<QueryRunResult> {
    if host_ids.is_empty() {
        return Err(FleetError::NoTargets);
    }

    let temporary = TemporaryQuery::create(conn, sql).await?;
    let outcome = run_saved_query(conn, temporary.id(), host_ids).await;
    temporary.cleanup().await;
    outcome
}

/// Runs a query, picking the execution mode:
///
/// - hosts only and `options.synchronous` → direct run
///   ([`run_saved_query`] or [`run_adhoc_query`]);
/// - otherwise → campaign, waiting iff `options.poll` is set.
pub async fn run_query(
    conn: &Connection,
    source: &QuerySource,
    targets: &QueryTargets,
    options: &RunOptions,
) -> Result<QueryExecution> {
    if targets.is_empty() {
        return Err(FleetError::NoTargets);
    }

    if options.synchronous && targets.labels.is_empty() {
        let result = match source {
            QuerySource::Saved(id) => run_saved_query(conn, *id, &targets.hosts).await?,
            QuerySource::Sql(sql) => run_adhoc_query(conn, sql, &targets.hosts).await?,
        };
        return Ok(QueryExecution::Direct(result));
    }

    let outcome = run_campaign(conn, source, targets, options.poll.as_ref()).await?;
    Ok(QueryExecution::Campaign(outcome))
}
