//! Host lookup and management.
//!
//! - [`list_hosts`]: every enrolled host matching the filters, all pages.
//! - [`get_host`]: one host by its numeric id.
//! - [`get_host_by_identifier`]: one host by hostname, UUID, serial number,
//!   or osquery node key.
//! - [`delete_host`]: remove a host record. The agent re-enrolls on its next
//!   check-in unless it is also uninstalled.
//!
//! [`Host`] keeps the fields callers commonly need for targeting; Fleet
//! returns many more, which are ignored on decode.

use serde::{Deserialize, Serialize};

use crate::client::Connection;
use crate::error::Result;
use crate::params::{QueryParams, encode_path_segment};

// ── Response types ─────────────────────────────────────────────────────

/// An enrolled host as returned by the Fleet API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// Fleet's numeric host id; the value used in query targets.
    pub id: u64,

    /// Hostname reported by the host.
    #[serde(default)]
    pub hostname: String,

    /// Name shown in the UI (computer name if set, else hostname).
    #[serde(default)]
    pub display_name: Option<String>,

    /// Hardware UUID reported by osquery.
    #[serde(default)]
    pub uuid: Option<String>,

    /// Hardware serial number.
    #[serde(default)]
    pub hardware_serial: Option<String>,

    /// Platform family, e.g. `"darwin"`, `"windows"`, `"ubuntu"`.
    #[serde(default)]
    pub platform: Option<String>,

    /// OS name and version, e.g. `"macOS 14.2"`.
    #[serde(default)]
    pub os_version: Option<String>,

    /// Installed osquery version.
    #[serde(default)]
    pub osquery_version: Option<String>,

    /// `"online"`, `"offline"`, `"new"`, or `"missing"`.
    #[serde(default)]
    pub status: Option<String>,

    /// `None` when the host belongs to no team.
    #[serde(default)]
    pub team_id: Option<u64>,

    /// Name of the host's team, if any.
    #[serde(default)]
    pub team_name: Option<String>,

    /// Primary IP address.
    #[serde(default)]
    pub primary_ip: Option<String>,

    /// Primary MAC address.
    #[serde(default)]
    pub primary_mac: Option<String>,

    /// ISO 8601 timestamp of the last agent check-in.
    #[serde(default)]
    pub seen_time: Option<String>,

    /// ISO 8601 timestamp of the last enrollment.
    #[serde(default)]
    pub last_enrolled_at: Option<String>,
}

#[derive(Deserialize)]
struct HostEnvelope {
    host: Host,
}

// ── Request types ──────────────────────────────────────────────────────

/// Filters for [`list_hosts`]. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListHostsParams {
    /// Matches hostname, UUID, serial number, or IP.
    #[serde(rename = "query")]
    pub search: Option<String>,
    /// `"online"`, `"offline"`, `"new"`, `"missing"`, or `"mia"`.
    pub status: Option<String>,
    /// Restrict to one team.
    pub team_id: Option<u64>,
    /// Restrict to members of one label.
    pub label_id: Option<u64>,
    /// Field to order by.
    pub order_key: Option<String>,
    /// `"asc"` or `"desc"`.
    pub order_direction: Option<String>,
    /// Page size used while walking pages.
    pub per_page: Option<u32>,
    /// Skip computing failing-policy counts; makes large listings faster.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disable_failing_policies: bool,
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Lists hosts, following every page.
///
/// # Errors
///
/// - `FleetError::BadRequest` for an unknown `order_key` or `status`.
/// - `FleetError::Forbidden` when the user cannot see the requested team.
pub async fn list_hosts(conn: &Connection, params: &ListHostsParams) -> Result<Vec<Host>> {
    conn.list("hosts", QueryParams::from_struct(params)?).await
}

/// Retrieves a host by numeric id.
pub async fn get_host(conn: &Connection, host_id: u64) -> Result<Host> {
    let envelope: HostEnvelope = conn.get(&format!("hosts/{host_id}")).await?;
    Ok(envelope.host)
}

/// Retrieves a host by hostname, UUID, hardware serial, or node key.
///
/// The identifier is percent-encoded into the path, so serials containing
/// `/` or spaces are safe.
pub async fn get_host_by_identifier(conn: &Connection, identifier: &str) -> Result<Host> {
    let endpoint = format!("hosts/identifier/{}", encode_path_segment(identifier));
    let envelope: HostEnvelope = conn.get(&endpoint).await?;
    Ok(envelope.host)
}

/// Deletes a host by id.
pub async fn delete_host(conn: &Connection, host_id: u64) -> Result<()> {
    conn.delete(&format!("hosts/{host_id}")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_deserializes_with_extra_fields() {
        let json = r#"{
            "id": 1,
            "hostname": "web-01.local",
            "display_name": "web-01",
            "uuid": "392547dc-0000-0000-a87a-d701ff75bc65",
            "hardware_serial": "C02X123",
            "platform": "ubuntu",
            "os_version": "Ubuntu 22.04.3 LTS",
            "osquery_version": "5.10.2",
            "status": "online",
            "team_id": null,
            "primary_ip": "10.0.0.5",
            "memory": 2084032512,
            "issues": {"failing_policies_count": 0, "total_issues_count": 0}
        }"#;
        let host: Host = serde_json::from_str(json).unwrap();
        assert_eq!(host.id, 1);
        assert_eq!(host.hostname, "web-01.local");
        assert_eq!(host.status.as_deref(), Some("online"));
        assert!(host.team_id.is_none());
    }

    #[test]
    fn list_params_skip_unset_and_false_flags() {
        let params = QueryParams::from_struct(&ListHostsParams {
            search: Some("web".to_string()),
            label_id: Some(6),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(params.get("query"), Some("web"));
        assert_eq!(params.get("label_id"), Some("6"));
        assert!(params.get("disable_failing_policies").is_none());
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn list_params_send_true_flag() {
        let params = QueryParams::from_struct(&ListHostsParams {
            disable_failing_policies: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(params.get("disable_failing_policies"), Some("true"));
    }
}
