//! Saved query management.
//!
//! - [`list_queries`]: paginated listing, optionally filtered.
//! - [`get_query`]: one query by id.
//! - [`create_query`] / [`update_query`]: write a query definition.
//! - [`delete_query_by_id`]: remove a query by id.
//!
//! Running queries lives in [`crate::live_query`] and [`crate::campaign`].

use serde::{Deserialize, Serialize};

use crate::client::Connection;
use crate::error::Result;
use crate::params::QueryParams;

/// A saved query as returned by the Fleet API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Query id.
    pub id: u64,
    /// Query name; unique per team.
    pub name: String,
    /// The SQL text.
    pub query: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// `None` for global queries.
    #[serde(default)]
    pub team_id: Option<u64>,
    /// Whether observers may run it live.
    #[serde(default)]
    pub observer_can_run: bool,
    /// Scheduled interval in seconds; 0 means not scheduled.
    #[serde(default)]
    pub interval: u64,
    /// Comma-separated platform list; empty means all.
    #[serde(default)]
    pub platform: Option<String>,
    /// Result logging mode, e.g. `"snapshot"`.
    #[serde(default)]
    pub logging: Option<String>,
    /// Name of the user who created it.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Deserialize)]
struct QueryEnvelope {
    query: Query,
}

/// Body for `POST queries`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateQueryRequest {
    /// Query name; unique per team.
    pub name: String,
    /// The SQL text.
    pub query: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether observers may run it live.
    pub observer_can_run: bool,
    /// Owning team; omitted for a global query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<u64>,
    /// Schedule interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Comma-separated platform list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Body for `PATCH queries/{id}`. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateQueryRequest {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New SQL text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New observer permission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer_can_run: Option<bool>,
    /// New schedule interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Filters for [`list_queries`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListQueriesParams {
    /// Substring match on name.
    #[serde(rename = "query")]
    pub search: Option<String>,
    /// Restrict to one team.
    pub team_id: Option<u64>,
    /// Include global queries when listing a team's queries.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub merge_inherited: bool,
    /// Field to order by.
    pub order_key: Option<String>,
    /// `"asc"` or `"desc"`.
    pub order_direction: Option<String>,
    /// Page size used while walking pages.
    pub per_page: Option<u32>,
}

/// Lists saved queries, following every page.
pub async fn list_queries(conn: &Connection, params: &ListQueriesParams) -> Result<Vec<Query>> {
    conn.list("queries", QueryParams::from_struct(params)?).await
}

/// Fetches one saved query by id.
pub async fn get_query(conn: &Connection, query_id: u64) -> Result<Query> {
    let envelope: QueryEnvelope = conn.get(&format!("queries/{query_id}")).await?;
    Ok(envelope.query)
}

/// Creates a saved query.
pub async fn create_query(conn: &Connection, request: &CreateQueryRequest) -> Result<Query> {
    let envelope: QueryEnvelope = conn.post("queries", request).await?;
    Ok(envelope.query)
}

/// Applies a partial update to a saved query.
pub async fn update_query(
    conn: &Connection,
    query_id: u64,
    update: &UpdateQueryRequest,
) -> Result<Query> {
    let envelope: QueryEnvelope = conn.patch(&format!("queries/{query_id}"), update).await?;
    Ok(envelope.query)
}

/// Deletes a query by id (`DELETE queries/id/{id}`).
///
/// # Errors
///
/// `FleetError::NotFound` if no query has that id.
pub async fn delete_query_by_id(conn: &Connection, query_id: u64) -> Result<()> {
    conn.delete(&format!("queries/id/{query_id}")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_deserializes_full_response() {
        let json = r#"{
            "created_at": "2024-01-03T15:04:05Z",
            "updated_at": "2024-01-03T15:04:05Z",
            "id": 31,
            "name": "centos_hosts",
            "description": "",
            "query": "SELECT 1 FROM os_version WHERE platform = 'centos';",
            "team_id": null,
            "interval": 3600,
            "platform": "",
            "min_osquery_version": "",
            "automations_enabled": false,
            "logging": "snapshot",
            "observer_can_run": true,
            "author_id": 1,
            "author_name": "John",
            "packs": []
        }"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(q.id, 31);
        assert_eq!(q.interval, 3600);
        assert!(q.observer_can_run);
        assert!(q.team_id.is_none());
        assert_eq!(q.author_name.as_deref(), Some("John"));
    }

    #[test]
    fn create_request_omits_unset_optionals() {
        let req = CreateQueryRequest {
            name: "n".to_string(),
            query: "SELECT 1;".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["observer_can_run"], false);
        assert!(json.get("team_id").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn update_request_only_sends_changed_fields() {
        let req = UpdateQueryRequest {
            query: Some("SELECT 2;".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"query": "SELECT 2;"}));
    }

    #[test]
    fn list_params_use_wire_names() {
        let params = QueryParams::from_struct(&ListQueriesParams {
            search: Some("usb".to_string()),
            team_id: Some(2),
            merge_inherited: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(params.get("query"), Some("usb"));
        assert_eq!(params.get("team_id"), Some("2"));
        assert_eq!(params.get("merge_inherited"), Some("true"));
        assert!(params.get("per_page").is_none());
    }
}
