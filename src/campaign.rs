//! Fire-and-poll query campaigns.
//!
//! A campaign is Fleet's server-side job for a live query sent to a set of
//! hosts and/or labels:
//!
//! 1. **POST** `queries/run`: starts the campaign and returns its id.
//! 2. **Poll GET** `campaigns/{id}`: repeat every [`PollConfig::interval`]
//!    until the status is `Finished` or [`PollConfig::timeout`] elapses.
//!
//! Reaching the deadline is not an error: the last snapshot is returned with
//! `partial = true`. A failed poll tick is logged and the loop keeps going.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Connection;
use crate::error::{FleetError, Result};
use crate::live_query::{QuerySource, QueryTargets};
use crate::results::{HostError, HostRows, RawHostResult, null_as_default, partition};

// ── Campaign types ───────────────────────────────────────────────────────

/// Lifecycle of a campaign.
///
/// The server encodes status as an integer (`0` waiting, `1` running,
/// `2` finished); string names are accepted too. Anything unrecognized maps
/// to `Unknown` and is treated as still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawStatus")]
pub enum CampaignStatus {
    /// Created; no host has picked it up yet.
    #[default]
    Waiting,
    /// Hosts are reporting results.
    Running,
    /// The campaign has closed; no more results will arrive.
    Finished,
    /// A status this client does not recognize.
    Unknown,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Code(i64),
    Name(String),
}

impl From<RawStatus> for CampaignStatus {
    fn from(raw: RawStatus) -> Self {
        match raw {
            RawStatus::Code(0) => CampaignStatus::Waiting,
            RawStatus::Code(1) => CampaignStatus::Running,
            RawStatus::Code(2) => CampaignStatus::Finished,
            RawStatus::Code(_) => CampaignStatus::Unknown,
            RawStatus::Name(name) => match name.to_ascii_lowercase().as_str() {
                "waiting" | "pending" => CampaignStatus::Waiting,
                "running" => CampaignStatus::Running,
                "finished" | "completed" => CampaignStatus::Finished,
                _ => CampaignStatus::Unknown,
            },
        }
    }
}

/// Host counts for a campaign's target set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTotals {
    /// Hosts targeted.
    #[serde(default)]
    pub count: u64,
    /// Targeted hosts that were online at launch.
    #[serde(default)]
    pub online: u64,
    /// Targeted hosts that were offline at launch.
    #[serde(default)]
    pub offline: u64,
    /// Targeted hosts that have not checked in for a long time.
    #[serde(default)]
    pub missing_in_action: u64,
}

/// A live-query campaign as the server reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign id, used for status polling.
    pub id: u64,
    /// Query the campaign runs; set for saved-query campaigns.
    #[serde(default)]
    pub query_id: Option<u64>,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: CampaignStatus,
    /// Host counts reported with the campaign.
    #[serde(default)]
    pub totals: CampaignTotals,
    /// Creation timestamp as sent by the server.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Final (or deadline) view of a campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    /// Campaign state from the last successful fetch.
    pub campaign: Campaign,
    /// Hosts that returned rows.
    pub results: Vec<HostRows>,
    /// Hosts that reported an error.
    pub errors: Vec<HostError>,
    /// Host counts, copied from `campaign`.
    pub totals: CampaignTotals,
    /// `true` when the wait ended before the campaign finished.
    pub partial: bool,
}

/// What [`run_campaign`] produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// Started; the caller did not ask to wait.
    Launched(Campaign),
    /// Waited until finished or until the deadline (see `partial`).
    Completed(CampaignReport),
    /// The server's reply carried no campaign id, so nothing was polled.
    Unacknowledged(Value),
}

// ── Polling configuration ────────────────────────────────────────────────

/// How often and how long to poll a campaign.
///
/// Defaults: 2-second interval, 60-second maximum wait.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before each status request.
    pub interval: Duration,
    /// Maximum total wait, measured from the start of polling.
    pub timeout: Duration,
}

impl PollConfig {
    /// Builds a config from an explicit interval and maximum wait.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        PollConfig { interval, timeout }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RunCampaignBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_id: Option<u64>,
    selected: Selected<'a>,
}

#[derive(Serialize)]
struct Selected<'a> {
    hosts: &'a [u64],
    labels: &'a [u64],
}

#[derive(Deserialize)]
struct CampaignEnvelope {
    campaign: Campaign,
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<RawHostResult>,
    #[serde(default, deserialize_with = "null_as_default")]
    errors: Vec<RawHostResult>,
}

/// Latest known state of a campaign while waiting.
struct Snapshot {
    campaign: Campaign,
    entries: Vec<RawHostResult>,
}

impl Snapshot {
    fn into_report(self, partial: bool) -> CampaignReport {
        let (results, errors) = partition(self.entries);
        CampaignReport {
            totals: self.campaign.totals.clone(),
            campaign: self.campaign,
            results,
            errors,
            partial,
        }
    }
}

// ── Operations ───────────────────────────────────────────────────────────

/// Starts a campaign and, when `poll` is set, waits for it.
///
/// # Errors
///
/// - `FleetError::NoTargets`: neither hosts nor labels were given.
/// - Any classified error from the launch request. Poll-tick failures are
///   never returned.
pub async fn run_campaign(
    conn: &Connection,
    source: &QuerySource,
    targets: &QueryTargets,
    poll: Option<&PollConfig>,
) -> Result<CampaignOutcome> {
    if targets.is_empty() {
        return Err(FleetError::NoTargets);
    }

    let body = RunCampaignBody {
        query: match source {
            QuerySource::Sql(sql) => Some(sql.as_str()),
            QuerySource::Saved(_) => None,
        },
        query_id: match source {
            QuerySource::Saved(id) => Some(*id),
            QuerySource::Sql(_) => None,
        },
        selected: Selected {
            hosts: &targets.hosts,
            labels: &targets.labels,
        },
    };
    let raw: Value = conn.post("queries/run", &body).await?;

    let Some(campaign) = campaign_from_response(&raw) else {
        warn!("campaign launch response carried no campaign id; not polling");
        return Ok(CampaignOutcome::Unacknowledged(raw));
    };
    info!(
        campaign_id = campaign.id,
        hosts = targets.hosts.len(),
        labels = targets.labels.len(),
        "campaign launched"
    );

    match poll {
        None => Ok(CampaignOutcome::Launched(campaign)),
        Some(config) => Ok(CampaignOutcome::Completed(
            wait_for_campaign(conn, campaign, config).await,
        )),
    }
}

/// Polls a campaign until it finishes or `config.timeout` elapses.
///
/// Never fails: a deadline yields `partial = true` built from one last
/// status fetch, or from the most recent good snapshot if that fetch fails.
pub async fn wait_for_campaign(
    conn: &Connection,
    launched: Campaign,
    config: &PollConfig,
) -> CampaignReport {
    let campaign_id = launched.id;
    let status_path = format!("campaigns/{campaign_id}");
    let started = Instant::now();
    let mut latest = Snapshot {
        campaign: launched,
        entries: Vec::new(),
    };

    loop {
        tokio::time::sleep(config.interval).await;

        // Check the deadline before the next request, not after it.
        if started.elapsed() >= config.timeout {
            break;
        }

        match fetch_snapshot(conn, &status_path).await {
            Ok(snapshot) => {
                debug!(campaign_id, status = ?snapshot.campaign.status, "campaign poll");
                let finished = snapshot.campaign.status == CampaignStatus::Finished;
                latest = snapshot;
                if finished {
                    return latest.into_report(false);
                }
            }
            Err(err) => warn!(campaign_id, error = %err, "campaign poll failed; will retry"),
        }
    }

    warn!(
        campaign_id,
        waited = ?started.elapsed(),
        "campaign did not finish within the maximum wait; returning partial results"
    );
    match fetch_snapshot(conn, &status_path).await {
        Ok(snapshot) => latest = snapshot,
        Err(err) => warn!(campaign_id, error = %err, "final campaign fetch failed; using last known state"),
    }
    let partial = latest.campaign.status != CampaignStatus::Finished;
    latest.into_report(partial)
}

async fn fetch_snapshot(conn: &Connection, status_path: &str) -> Result<Snapshot> {
    let envelope: CampaignEnvelope = conn.get(status_path).await?;
    let mut entries = envelope.results;
    entries.extend(envelope.errors);
    Ok(Snapshot {
        campaign: envelope.campaign,
        entries,
    })
}

/// Reads the campaign from a launch response, accepting both the wrapped
/// `{"campaign": {...}}` shape and a bare campaign object.
fn campaign_from_response(raw: &Value) -> Option<Campaign> {
    let candidate = raw.get("campaign").unwrap_or(raw);
    candidate.get("id")?.as_u64()?;
    serde_json::from_value(candidate.clone()).ok()
}
