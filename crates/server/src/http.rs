//! HTTP surface: ring status, health, metrics, and the per-tenant rules and
//! alert-config APIs.
//!
//! Tenant-scoped routes read the tenant from the `X-Scope-OrgID` header.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ruler_core::{TenantId, ORG_ID_HEADER};
use ruler_rules::validation::{validate_group_format, ValidationError};
use ruler_rules::RuleGroupFormat;
use ruler_storage::{AlertConfig, AlertConfigStore, StorageError};

use crate::ruler::Ruler;

#[derive(Clone)]
pub struct AppState {
    pub ruler: Arc<Ruler>,
    pub alerts: Arc<dyn AlertConfigStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ruler/ring", get(ring_status))
        .route("/api/v1/rules", get(list_rules))
        .route(
            "/api/v1/rules/{namespace}",
            get(list_namespace).post(create_group),
        )
        .route(
            "/api/v1/rules/{namespace}/{group}",
            get(get_group).delete(delete_group),
        )
        .route(
            "/api/v1/alerts",
            get(get_alerts).post(set_alerts).delete(delete_alerts),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Tenant extraction ───────────────────────────────────────────────

/// Tenant named by the `X-Scope-OrgID` request header.
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ORG_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "no org id"))?;
        TenantId::new(raw)
            .map(Tenant)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let status = match &e {
            StorageError::GroupNotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::InvalidIdentifier { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %e, "rule store request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

// ── Operational ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        state: format!("{:?}", state.ruler.state()),
    })
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .ruler
        .render_metrics()
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn ring_status(State(state): State<AppState>) -> Html<String> {
    Html(state.ruler.status_page())
}

// ── Rules API ───────────────────────────────────────────────────────

type NamespaceGroups = BTreeMap<String, Vec<RuleGroupFormat>>;

fn yaml_response(groups: &NamespaceGroups) -> Result<Response, ApiError> {
    let body = serde_yaml::to_string(groups)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], body).into_response())
}

async fn list_groups(state: &AppState, tenant: &TenantId, namespace: &str) -> Result<Response, ApiError> {
    let groups = state
        .ruler
        .store()
        .list_rule_groups(tenant, namespace)
        .await?;
    if groups.is_empty() {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "no rule groups found"));
    }
    let mut by_ns = NamespaceGroups::new();
    for desc in &groups {
        by_ns
            .entry(desc.namespace.clone())
            .or_default()
            .push(RuleGroupFormat::from_desc(desc));
    }
    yaml_response(&by_ns)
}

async fn list_rules(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<Response, ApiError> {
    list_groups(&state, &tenant, "").await
}

async fn list_namespace(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(namespace): Path<String>,
) -> Result<Response, ApiError> {
    list_groups(&state, &tenant, &namespace).await
}

async fn get_group(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path((namespace, group)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let desc = state
        .ruler
        .store()
        .get_rule_group(&tenant, &namespace, &group)
        .await?;
    let body = serde_yaml::to_string(&RuleGroupFormat::from_desc(&desc))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], body).into_response())
}

#[derive(Serialize)]
struct ValidationFailure {
    error: &'static str,
    errors: Vec<ValidationError>,
}

/// Store one rule group, given as YAML, under `namespace`.
async fn create_group(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path(namespace): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    let format: RuleGroupFormat = serde_yaml::from_str(&body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid rule group: {e}")))?;

    let result = validate_group_format(&format);
    if !result.valid {
        let failure = ValidationFailure {
            error: "rule group failed validation",
            errors: result.errors,
        };
        return Ok((StatusCode::BAD_REQUEST, Json(failure)).into_response());
    }

    let desc = format
        .into_desc(&tenant, &namespace)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    state.ruler.store().set_rule_group(&desc).await?;
    info!(tenant = %tenant, namespace = %namespace, group = %desc.name, "rule group stored");
    Ok(StatusCode::ACCEPTED.into_response())
}

async fn delete_group(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Path((namespace, group)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .ruler
        .store()
        .delete_rule_group(&tenant, &namespace, &group)
        .await?;
    info!(tenant = %tenant, namespace = %namespace, group = %group, "rule group deleted");
    Ok(StatusCode::ACCEPTED)
}

// ── Alertmanager config API ─────────────────────────────────────────

async fn get_alerts(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<Json<AlertConfig>, ApiError> {
    Ok(Json(state.alerts.get_alert_config(&tenant).await?))
}

async fn set_alerts(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Json(config): Json<AlertConfig>,
) -> Result<StatusCode, ApiError> {
    state.alerts.set_alert_config(&tenant, &config).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_alerts(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<StatusCode, ApiError> {
    state.alerts.delete_alert_config(&tenant).await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruler::RulerDeps;
    use crate::scheduler::tests::EmptyEngine;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use ruler_core::config::{RingConfig, RulerConfig};
    use ruler_rules::DiscardPusher;
    use ruler_storage::RulerStorage;
    use tower::ServiceExt;

    fn app() -> Router {
        let storage = RulerStorage::in_memory();
        let ruler = Ruler::new(
            RulerConfig::default(),
            RingConfig::default(),
            RulerDeps {
                store: storage.rules.clone(),
                engine: Arc::new(EmptyEngine),
                pusher: Arc::new(DiscardPusher),
                membership: None,
                transport: None,
            },
        )
        .unwrap();
        router(AppState {
            ruler: Arc::new(ruler),
            alerts: storage.alerts.clone(),
        })
    }

    fn request(method: &str, uri: &str, tenant: Option<&str>, body: &str) -> Request<Body> {
        let mut b = Request::builder().method(method).uri(uri);
        if let Some(t) = tenant {
            b = b.header(ORG_ID_HEADER, t);
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const GROUP: &str = "name: api\ninterval: 30s\nrules:\n  - record: job:up:sum\n    expr: sum(up)\n";

    #[tokio::test]
    async fn missing_org_id_is_unauthorized() {
        let resp = app()
            .oneshot(request("GET", "/api/v1/rules", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ring_page_when_sharding_disabled() {
        let resp = app()
            .oneshot(request("GET", "/ruler/ring", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("shards disabled"));
    }

    #[tokio::test]
    async fn create_list_get_delete_group() {
        let app = app();

        let resp = app
            .clone()
            .oneshot(request("POST", "/api/v1/rules/team", Some("t1"), GROUP))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/v1/rules", Some("t1"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let listed: NamespaceGroups = serde_yaml::from_str(&body_string(resp).await).unwrap();
        assert_eq!(listed["team"].len(), 1);
        assert_eq!(listed["team"][0].name, "api");

        // Another tenant sees nothing.
        let resp = app
            .clone()
            .oneshot(request("GET", "/api/v1/rules", Some("t2"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/v1/rules/team/api", Some("t1"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("job:up:sum"));

        let resp = app
            .clone()
            .oneshot(request("DELETE", "/api/v1/rules/team/api", Some("t1"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = app
            .oneshot(request("GET", "/api/v1/rules/team/api", Some("t1"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_group_is_rejected() {
        let bad = "name: api\nrules:\n  - record: job:up:sum\n    expr: \"\"\n";
        let resp = app()
            .oneshot(request("POST", "/api/v1/rules/team", Some("t1"), bad))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn alert_config_roundtrip() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/alerts")
                    .header(ORG_ID_HEADER, "t1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"raw_config":"route: {}"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/v1/alerts", Some("t1"), ""))
            .await
            .unwrap();
        let cfg: AlertConfig = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(cfg.user, "t1");
        assert_eq!(cfg.raw_config, "route: {}");

        let resp = app
            .oneshot(request("DELETE", "/api/v1/alerts", Some("t1"), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let resp = app()
            .oneshot(request("GET", "/metrics", None, ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("ruler_ring_check_errors_total"));
    }
}
