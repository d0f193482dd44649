//! BigQuery-backed warehouse gateway.
//!
//! Runs queries through the REST `jobs.query` endpoint and decodes the
//! paged response into [`TableData`]. BigQuery serializes every cell as a
//! string; the schema's field types drive conversion back to JSON numbers
//! and booleans so the dashboards get typed values.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use skylight_core::{GatewayError, TableData};
use std::time::Duration;

use crate::config::WarehouseConfig;
use crate::retry::{bounded, with_retry};
use crate::warehouse::Warehouse;

const BIGQUERY_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Warehouse gateway over the BigQuery REST API.
#[derive(Debug)]
pub struct BigQueryWarehouse {
    http: reqwest::Client,
    project: String,
    token: SecretString,
    timeout: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl BigQueryWarehouse {
    /// Build a warehouse from configuration; fails fast when the project or
    /// token is missing.
    pub fn from_config(config: &WarehouseConfig) -> Result<Self, GatewayError> {
        if config.project.trim().is_empty() {
            return Err(GatewayError::MissingCredentials {
                detail: "SKYLIGHT_BQ_PROJECT is not set".to_string(),
            });
        }
        let token = match &config.access_token {
            Some(token) if !token.expose_secret().trim().is_empty() => token.clone(),
            _ => {
                return Err(GatewayError::MissingCredentials {
                    detail: "SKYLIGHT_GCP_ACCESS_TOKEN is not set".to_string(),
                })
            }
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            project: config.project.clone(),
            token,
            timeout: config.timeout,
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff,
        })
    }

    async fn run_query(&self, sql: &str) -> Result<TableData, GatewayError> {
        let url = format!("{}/projects/{}/queries", BIGQUERY_BASE, self.project);
        let body = serde_json::json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": self.timeout.as_millis() as u64,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let mut page: QueryResponse = resp.json().await.map_err(|e| GatewayError::Decode {
            reason: format!("invalid query response: {}", e),
        })?;

        if !page.job_complete {
            return Err(GatewayError::Timeout {
                operation: "warehouse query".to_string(),
                elapsed_ms: self.timeout.as_millis() as u64,
            });
        }

        let schema = page.schema.take().ok_or_else(|| GatewayError::Decode {
            reason: "query response missing schema".to_string(),
        })?;

        let mut table = TableData::new(
            schema.fields.iter().map(|f| f.name.clone()).collect(),
            Vec::new(),
        );
        append_rows(&mut table, &schema, &page.rows)?;

        // Remaining pages come from getQueryResults, keyed by the job id.
        let mut page_token = page.page_token;
        while let Some(token) = page_token {
            let job_id = page
                .job_reference
                .as_ref()
                .map(|j| j.job_id.as_str())
                .ok_or_else(|| GatewayError::Decode {
                    reason: "paged response missing job reference".to_string(),
                })?;
            let next = self.fetch_page(job_id, &token).await?;
            append_rows(&mut table, &schema, &next.rows)?;
            page_token = next.page_token;
        }

        Ok(table)
    }

    async fn fetch_page(&self, job_id: &str, token: &str) -> Result<QueryResponse, GatewayError> {
        let url = format!(
            "{}/projects/{}/queries/{}?pageToken={}",
            BIGQUERY_BASE,
            self.project,
            urlencoding::encode(job_id),
            urlencoding::encode(token)
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        resp.json().await.map_err(|e| GatewayError::Decode {
            reason: format!("invalid query results page: {}", e),
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn query(&self, sql: &str) -> Result<TableData, GatewayError> {
        with_retry("warehouse query", self.retry_attempts, self.retry_backoff, || {
            bounded("warehouse query", self.timeout, self.run_query(sql))
        })
        .await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            operation: "warehouse query".to_string(),
            elapsed_ms: 0,
        }
    } else {
        GatewayError::Transport {
            reason: e.to_string(),
        }
    }
}

fn status_error(status: StatusCode) -> GatewayError {
    if status.is_server_error() {
        GatewayError::Transport {
            reason: format!("server error: {}", status),
        }
    } else {
        GatewayError::UnexpectedResponse {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    }
}

// ============================================================================
// RESPONSE DECODING
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default, rename = "jobComplete")]
    job_complete: bool,
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<BqRow>,
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
    #[serde(rename = "jobReference")]
    job_reference: Option<JobReference>,
}

#[derive(Debug, Deserialize)]
struct JobReference {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    name: String,
    #[serde(default, rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct BqRow {
    #[serde(default)]
    f: Vec<BqCell>,
}

#[derive(Debug, Deserialize)]
struct BqCell {
    #[serde(default)]
    v: serde_json::Value,
}

fn append_rows(
    table: &mut TableData,
    schema: &Schema,
    rows: &[BqRow],
) -> Result<(), GatewayError> {
    for row in rows {
        if row.f.len() != schema.fields.len() {
            return Err(GatewayError::Decode {
                reason: format!(
                    "row has {} cells, schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                ),
            });
        }
        let decoded = row
            .f
            .iter()
            .zip(&schema.fields)
            .map(|(cell, field)| decode_cell(&field.field_type, &cell.v))
            .collect();
        table.rows.push(decoded);
    }
    Ok(())
}

/// Convert one BigQuery cell (string-encoded) back into a typed JSON value.
/// Unparseable values fall back to the raw string rather than failing the
/// whole result set.
fn decode_cell(field_type: &str, value: &serde_json::Value) -> serde_json::Value {
    let text = match value {
        serde_json::Value::Null => return serde_json::Value::Null,
        serde_json::Value::String(s) => s.as_str(),
        other => return other.clone(),
    };

    match field_type {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::from(text)),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
            .parse::<f64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::from(text)),
        "BOOLEAN" | "BOOL" => match text {
            "true" => serde_json::Value::Bool(true),
            "false" => serde_json::Value::Bool(false),
            _ => serde_json::Value::from(text),
        },
        _ => serde_json::Value::from(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_config_requires_project_and_token() {
        let err = BigQueryWarehouse::from_config(&WarehouseConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredentials { .. }));

        let missing_token = WarehouseConfig {
            project: "variant-finance".to_string(),
            ..Default::default()
        };
        let err = BigQueryWarehouse::from_config(&missing_token).unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredentials { .. }));
    }

    #[test]
    fn test_decode_cell_typed_values() {
        assert_eq!(decode_cell("INTEGER", &json!("42")), json!(42));
        assert_eq!(decode_cell("FLOAT", &json!("4.25")), json!(4.25));
        assert_eq!(decode_cell("BOOLEAN", &json!("true")), json!(true));
        assert_eq!(decode_cell("STRING", &json!("JF2788ST")), json!("JF2788ST"));
        assert_eq!(decode_cell("INTEGER", &json!(null)), json!(null));
        // Unparseable numerics fall back to the raw string.
        assert_eq!(decode_cell("INTEGER", &json!("n/a")), json!("n/a"));
    }

    #[test]
    fn test_query_response_round_trip() {
        let raw = json!({
            "jobComplete": true,
            "jobReference": {"jobId": "job_abc"},
            "schema": {"fields": [
                {"name": "plan", "type": "STRING"},
                {"name": "value", "type": "FLOAT"}
            ]},
            "rows": [
                {"f": [{"v": "JF2788ST"}, {"v": "12.5"}]},
                {"f": [{"v": "AT1001"}, {"v": null}]}
            ]
        });

        let mut page: QueryResponse = serde_json::from_value(raw).unwrap();
        assert!(page.job_complete);
        let schema = page.schema.take().unwrap();

        let mut table = TableData::new(
            schema.fields.iter().map(|f| f.name.clone()).collect(),
            Vec::new(),
        );
        append_rows(&mut table, &schema, &page.rows).unwrap();

        assert_eq!(table.columns, vec!["plan".to_string(), "value".to_string()]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec![json!("JF2788ST"), json!(12.5)]);
        assert_eq!(table.rows[1], vec![json!("AT1001"), json!(null)]);
    }

    #[test]
    fn test_append_rows_rejects_shape_mismatch() {
        let schema = Schema {
            fields: vec![Field {
                name: "only".to_string(),
                field_type: "STRING".to_string(),
            }],
        };
        let rows = vec![BqRow {
            f: vec![
                BqCell { v: json!("a") },
                BqCell { v: json!("extra") },
            ],
        }];

        let mut table = TableData::new(vec!["only".to_string()], Vec::new());
        let err = append_rows(&mut table, &schema, &rows).unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }
}
