//! Per-host query result types shared by both execution modes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One result row: column name → value (Fleet sends strings).
pub type Row = Map<String, Value>;

/// A host entry exactly as the server returns it, before partitioning.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHostResult {
    /// Host that produced this entry.
    #[serde(alias = "host")]
    pub host_id: u64,
    /// Result rows; empty when the host failed.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Row>,
    /// `null`/absent for success, otherwise the host's error.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Rows returned by a host that ran the query successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRows {
    /// Host that produced the rows.
    pub host_id: u64,
    /// The rows, in server order.
    pub rows: Vec<Row>,
    /// `rows.len()`.
    pub row_count: usize,
}

/// A host that reported an error instead of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostError {
    /// Host that failed.
    pub host_id: u64,
    /// The host's error text; non-string errors are rendered as JSON.
    pub error: String,
}

/// Deserializes an explicit `null` as `T::default()`.
///
/// Fleet encodes empty Go slices as `null`, which `#[serde(default)]` alone
/// does not cover.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Splits raw entries into successes and failures on the presence of a
/// non-null `error`. Entry order within each side follows the input.
pub fn partition(entries: Vec<RawHostResult>) -> (Vec<HostRows>, Vec<HostError>) {
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        match entry.error {
            None | Some(Value::Null) => results.push(HostRows {
                host_id: entry.host_id,
                row_count: entry.rows.len(),
                rows: entry.rows,
            }),
            Some(Value::String(error)) => errors.push(HostError {
                host_id: entry.host_id,
                error,
            }),
            Some(other) => errors.push(HostError {
                host_id: entry.host_id,
                error: other.to_string(),
            }),
        }
    }
    (results, errors)
}

/// `responded / targeted * 100` rounded to two decimals; 0 when nothing was targeted.
pub fn response_rate(targeted: u64, responded: u64) -> f64 {
    if targeted == 0 {
        return 0.0;
    }
    let percent = responded as f64 * 100.0 / targeted as f64;
    (percent * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partition_splits_on_error_presence() {
        let entries: Vec<RawHostResult> = serde_json::from_value(json!([
            {"host_id": 1, "rows": [{"a": "1"}, {"a": "2"}], "error": null},
            {"host_id": 2, "rows": [], "error": "no such table: foo"},
            {"host": 3, "rows": [{"a": "3"}]},
            {"host_id": 4, "error": {"code": 7}}
        ]))
        .unwrap();

        let (results, errors) = partition(entries);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].host_id, 1);
        assert_eq!(results[0].row_count, 2);
        assert_eq!(results[1].host_id, 3);
        assert_eq!(
            errors,
            vec![
                HostError {
                    host_id: 2,
                    error: "no such table: foo".to_string()
                },
                HostError {
                    host_id: 4,
                    error: r#"{"code":7}"#.to_string()
                },
            ]
        );
    }

    #[test]
    fn null_rows_on_an_errored_host_are_empty() {
        let entries: Vec<RawHostResult> = serde_json::from_value(json!([
            {"host_id": 1, "rows": [{"a": "1"}], "error": null},
            {"host_id": 2, "rows": null, "error": "no such table: foo"}
        ]))
        .unwrap();

        assert!(entries[1].rows.is_empty());
        let (results, errors) = partition(entries);
        assert_eq!(results.len(), 1);
        assert_eq!(errors[0].host_id, 2);
        assert_eq!(errors[0].error, "no such table: foo");
    }

    #[test]
    fn response_rate_rounds_to_two_decimals() {
        assert_eq!(response_rate(10, 7), 70.0);
        assert_eq!(response_rate(3, 1), 33.33);
        assert_eq!(response_rate(3, 2), 66.67);
        assert_eq!(response_rate(2, 2), 100.0);
    }

    #[test]
    fn response_rate_is_zero_without_targets() {
        assert_eq!(response_rate(0, 0), 0.0);
        assert_eq!(response_rate(0, 5), 0.0);
    }
}
