//! Software inventory: titles aggregated across hosts.

use serde::{Deserialize, Serialize};

use crate::client::Connection;
use crate::error::Result;
use crate::params::QueryParams;

/// One installed version of a title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareVersion {
    /// Version id.
    pub id: u64,
    /// Version string as reported by the host.
    pub version: String,
    /// CVE ids affecting this version, when known.
    #[serde(default)]
    pub vulnerabilities: Option<Vec<String>>,
    /// Hosts with this version installed.
    #[serde(default)]
    pub hosts_count: Option<u64>,
}

/// A software title (name + source), with per-version breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareTitle {
    /// Title id.
    pub id: u64,
    /// Software name.
    pub name: String,
    /// Where osquery found it, e.g. `"apps"`, `"deb_packages"`, `"programs"`.
    #[serde(default)]
    pub source: Option<String>,
    /// Hosts with any version installed.
    #[serde(default)]
    pub hosts_count: u64,
    /// Number of distinct versions seen.
    #[serde(default)]
    pub versions_count: u64,
    /// Per-version breakdown.
    #[serde(default)]
    pub versions: Vec<SoftwareVersion>,
}

#[derive(Deserialize)]
struct SoftwareTitleEnvelope {
    software_title: SoftwareTitle,
}

/// Filters for [`list_software_titles`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListSoftwareParams {
    /// Substring match on name.
    #[serde(rename = "query")]
    pub search: Option<String>,
    /// Restrict to one team.
    pub team_id: Option<u64>,
    /// Only titles with known vulnerabilities.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub vulnerable: bool,
    /// Field to order by.
    pub order_key: Option<String>,
    /// `"asc"` or `"desc"`.
    pub order_direction: Option<String>,
    /// Page size used while walking pages.
    pub per_page: Option<u32>,
}

/// Lists software titles, following every page.
pub async fn list_software_titles(
    conn: &Connection,
    params: &ListSoftwareParams,
) -> Result<Vec<SoftwareTitle>> {
    conn.list("software/titles", QueryParams::from_struct(params)?)
        .await
}

/// Fetches one software title by id.
pub async fn get_software_title(conn: &Connection, title_id: u64) -> Result<SoftwareTitle> {
    let envelope: SoftwareTitleEnvelope = conn.get(&format!("software/titles/{title_id}")).await?;
    Ok(envelope.software_title)
}
