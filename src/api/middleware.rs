use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::routes::{evaluate, AppState};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant";

/// Authorize a request with the current access pipeline.
///
/// The pipeline input is built from the request method, path and
/// `x-user-id`; `x-tenant`, when present, becomes the context. On success the
/// [`Verdict`](crate::Verdict) is available to handlers as an extension.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let active = state.policy_rx.borrow().clone();

    let input = request_input(request.method(), request.uri().path(), request.headers());
    let context =
        header_str(request.headers(), TENANT_HEADER).map(|tenant| json!({ "tenant": tenant }));

    match evaluate(
        &state,
        &active.pipeline,
        active.version(),
        request_id,
        input,
        context,
    )
    .await
    {
        Ok(verdict) => {
            request.extensions_mut().insert(verdict);
            next.run(request).await
        }
        Err(rejection) => rejection.into_response(),
    }
}

fn request_input(method: &Method, path: &str, headers: &HeaderMap) -> Value {
    json!({
        "userId": header_str(headers, USER_ID_HEADER).unwrap_or_default(),
        "action": action_for(method),
        "resource": path,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Safe methods read; everything else writes.
fn action_for(method: &Method) -> &'static str {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => "read",
        _ => "write",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::domain::AccessPolicy;
    use crate::observability::MetricsRegistry;
    use crate::policy::ActivePolicy;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn test_router() -> axum::Router {
        let policy: AccessPolicy = serde_yaml::from_str(
            r#"
policy_version: "mw-1"
roles:
  editor: ["read", "write"]
  guest: ["read"]
users:
  alice: editor
tenants: ["acme"]
"#,
        )
        .unwrap();
        let (_tx, rx) = watch::channel(Arc::new(ActivePolicy::new(policy).unwrap()));

        create_router(Arc::new(AppState {
            policy_rx: rx,
            metrics: Arc::new(MetricsRegistry::new()),
            start_time: Instant::now(),
            version: "0.1.0-test".to_string(),
            invocation_timeout: Duration::from_secs(1),
            latency_budget_ms: 100,
        }))
    }

    fn resource_request(method: &str, user: Option<&str>, tenant: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method(method)
            .uri("/v1/resources/doc-1");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_action_for_method() {
        assert_eq!(action_for(&Method::GET), "read");
        assert_eq!(action_for(&Method::HEAD), "read");
        assert_eq!(action_for(&Method::PUT), "write");
        assert_eq!(action_for(&Method::DELETE), "write");
    }

    #[test]
    fn test_request_input_without_user() {
        let input = request_input(&Method::GET, "/v1/resources/x", &HeaderMap::new());

        assert_eq!(input["userId"], json!(""));
        assert_eq!(input["resource"], json!("/v1/resources/x"));
    }

    #[tokio::test]
    async fn test_authorized_request_reaches_handler() {
        let response = test_router()
            .oneshot(resource_request("PUT", Some("alice"), Some("acme")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["resource"], json!("doc-1"));
        assert_eq!(body["grant"]["role"], json!("editor"));
        assert_eq!(body["grant"]["action"], json!("write"));
    }

    #[tokio::test]
    async fn test_denied_request_short_circuits() {
        let response = test_router()
            .oneshot(resource_request("PUT", Some("bob"), Some("acme")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["rule"], json!("checkAction"));
    }

    #[tokio::test]
    async fn test_missing_user_fails_check_id() {
        let response = test_router()
            .oneshot(resource_request("GET", None, Some("acme")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["rule"], json!("checkId"));
        assert_eq!(body["reason"], json!("user id is empty"));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_denied() {
        let response = test_router()
            .oneshot(resource_request("GET", Some("alice"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["rule"], json!("checkTenant"));
    }
}
