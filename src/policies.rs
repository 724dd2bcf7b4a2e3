//! Global policy management.
//!
//! A policy is a yes/no query: hosts that return rows pass, hosts that
//! return none fail. Only global (not team) policies are covered here.

use serde::{Deserialize, Serialize};

use crate::client::Connection;
use crate::error::Result;
use crate::params::QueryParams;

/// A policy as returned by the Fleet API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy id.
    pub id: u64,
    /// Policy name.
    pub name: String,
    /// The SQL text.
    pub query: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// What to do when a host fails the policy.
    #[serde(default)]
    pub resolution: Option<String>,
    /// Comma-separated platform list; empty means all.
    #[serde(default)]
    pub platform: Option<String>,
    /// Marks the policy as critical (Fleet Premium).
    #[serde(default)]
    pub critical: bool,
    /// `None` for global policies.
    #[serde(default)]
    pub team_id: Option<u64>,
    /// Hosts passing the policy at the last count.
    #[serde(default)]
    pub passing_host_count: u64,
    /// Hosts failing the policy at the last count.
    #[serde(default)]
    pub failing_host_count: u64,
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
struct PolicyEnvelope {
    policy: Policy,
}

/// Body for `POST global/policies`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatePolicyRequest {
    /// Policy name; unique per team.
    pub name: String,
    /// SQL that returns a row when the host passes.
    pub query: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What to do when a host fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Comma-separated platform list; omitted means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Marks the policy as critical (Fleet Premium).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub critical: bool,
}

#[derive(Serialize)]
struct DeletePoliciesBody<'a> {
    ids: &'a [u64],
}

#[derive(Deserialize)]
struct DeletePoliciesResponse {
    #[serde(default)]
    deleted: Vec<u64>,
}

/// Lists global policies, following every page.
pub async fn list_global_policies(conn: &Connection) -> Result<Vec<Policy>> {
    conn.list("global/policies", QueryParams::new()).await
}

/// Fetches one global policy by id.
pub async fn get_global_policy(conn: &Connection, policy_id: u64) -> Result<Policy> {
    let envelope: PolicyEnvelope = conn.get(&format!("global/policies/{policy_id}")).await?;
    Ok(envelope.policy)
}

/// Creates a global policy.
pub async fn create_global_policy(conn: &Connection, request: &CreatePolicyRequest) -> Result<Policy> {
    let envelope: PolicyEnvelope = conn.post("global/policies", request).await?;
    Ok(envelope.policy)
}

/// Deletes several global policies in one call and returns the ids the
/// server reports as deleted.
///
/// An empty `ids` slice is a no-op and sends nothing.
pub async fn delete_global_policies(conn: &Connection, ids: &[u64]) -> Result<Vec<u64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let response: DeletePoliciesResponse = conn
        .post("global/policies/delete", &DeletePoliciesBody { ids })
        .await?;
    Ok(response.deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_deserializes_counts() {
        let json = r#"{
            "id": 1,
            "name": "Gatekeeper enabled",
            "query": "SELECT 1 FROM gatekeeper WHERE assessments_enabled = 1;",
            "description": "Checks if gatekeeper is enabled on macOS devices",
            "critical": false,
            "author_id": 42,
            "author_name": "John",
            "team_id": null,
            "resolution": "Resolution steps",
            "platform": "darwin",
            "passing_host_count": 2000,
            "failing_host_count": 300
        }"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.failing_host_count, 300);
        assert_eq!(policy.platform.as_deref(), Some("darwin"));
    }

    #[test]
    fn create_request_omits_false_critical() {
        let json = serde_json::to_value(CreatePolicyRequest {
            name: "p".to_string(),
            query: "SELECT 1;".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"name": "p", "query": "SELECT 1;"}));
    }
}
