//! Evaluation engine and result-appender seams.
//!
//! The ruler treats expression evaluation as an opaque call: an
//! [`EvaluationEngine`] is constructed with its queryable source bound in and
//! returns an instant [`Vector`] for an expression at a timestamp. Recorded
//! series go back out through a [`Pusher`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ruler_core::{TenantId, ORG_ID_HEADER};

use crate::error::EngineError;

/// Label set of a series, ordered by name.
pub type Labels = BTreeMap<String, String>;

/// One sample of an instant vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub type Vector = Vec<Sample>;

#[async_trait]
pub trait EvaluationEngine: Send + Sync {
    /// Evaluate `expr` as an instant query at `ts` on behalf of `tenant`.
    async fn query(
        &self,
        tenant: &TenantId,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, EngineError>;
}

/// Destination for samples produced by recording rules.
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, tenant: &TenantId, samples: Vec<Sample>) -> Result<(), EngineError>;
}

/// Pusher used when no push endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPusher;

#[async_trait]
impl Pusher for DiscardPusher {
    async fn push(&self, tenant: &TenantId, samples: Vec<Sample>) -> Result<(), EngineError> {
        debug!(tenant = %tenant, samples = samples.len(), "no push endpoint, dropping recorded samples");
        Ok(())
    }
}

// ── HTTP query engine ─────────────────────────────────────────

/// Instant queries against a Prometheus-compatible `/api/v1/query` endpoint.
#[derive(Debug, Clone)]
pub struct HttpQueryEngine {
    base_url: String,
    client: reqwest::Client,
}

impl HttpQueryEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorEntry>),
    Scalar((f64, String)),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    metric: Labels,
    value: (f64, String),
}

fn parse_point(ts: f64, raw: &str) -> Result<(DateTime<Utc>, f64), EngineError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| EngineError::Decode(format!("sample value '{raw}' is not a number")))?;
    let millis = (ts * 1000.0).round() as i64;
    let at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| EngineError::Decode(format!("timestamp {ts} out of range")))?;
    Ok((at, value))
}

fn decode_response(resp: QueryResponse) -> Result<Vector, EngineError> {
    if resp.status != "success" {
        return Err(EngineError::Other(
            resp.error.unwrap_or_else(|| format!("query status '{}'", resp.status)),
        ));
    }
    match resp.data {
        Some(QueryData::Vector(entries)) => entries
            .into_iter()
            .map(|e| {
                let (timestamp, value) = parse_point(e.value.0, &e.value.1)?;
                Ok(Sample {
                    labels: e.metric,
                    value,
                    timestamp,
                })
            })
            .collect(),
        Some(QueryData::Scalar((ts, raw))) => {
            let (timestamp, value) = parse_point(ts, &raw)?;
            Ok(vec![Sample {
                labels: Labels::new(),
                value,
                timestamp,
            }])
        }
        Some(QueryData::Matrix(_)) | Some(QueryData::String(_)) => Err(EngineError::Decode(
            "rule expressions must evaluate to a vector or scalar".into(),
        )),
        None => Err(EngineError::Decode("response has no data".into())),
    }
}

#[async_trait]
impl EvaluationEngine for HttpQueryEngine {
    async fn query(
        &self,
        tenant: &TenantId,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, EngineError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let time = format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0);
        let resp = self
            .client
            .get(&url)
            .header(ORG_ID_HEADER, tenant.as_str())
            .query(&[("query", expr), ("time", time.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() && status != reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let message = resp.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body: QueryResponse = resp.json().await?;
        decode_response(body)
    }
}

// ── HTTP pusher ───────────────────────────────────────────────

/// Posts recorded samples as JSON `{"samples": [...]}` to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpPusher {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PushBody<'a> {
    samples: &'a [Sample],
}

impl HttpPusher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Pusher for HttpPusher {
    async fn push(&self, tenant: &TenantId, samples: Vec<Sample>) -> Result<(), EngineError> {
        if samples.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(&self.url)
            .header(ORG_ID_HEADER, tenant.as_str())
            .json(&PushBody { samples: &samples })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<Vector, EngineError> {
        decode_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn decodes_vector_result() {
        let v = decode(
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"__name__":"up","job":"api"},"value":[1700000000.5,"1"]},
                {"metric":{"job":"db"},"value":[1700000000.5,"0"]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].labels["job"], "api");
        assert_eq!(v[0].value, 1.0);
        assert_eq!(v[0].timestamp.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn decodes_scalar_as_single_unlabelled_sample() {
        let v = decode(r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"42"]}}"#)
            .unwrap();
        assert_eq!(v.len(), 1);
        assert!(v[0].labels.is_empty());
        assert_eq!(v[0].value, 42.0);
    }

    #[test]
    fn error_status_is_reported() {
        let err = decode(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "parse error");
    }

    #[test]
    fn matrix_is_rejected() {
        assert!(matches!(
            decode(r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn special_float_values_parse() {
        let v = decode(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1,"NaN"]}]}}"#,
        )
        .unwrap();
        assert!(v[0].value.is_nan());
    }
}
