//! Admin HTTP API.
//!
//! # Routes
//! ```text
//! GET  /admin/status                 version, breaker count
//! GET  /admin/stats                  error statistics snapshot
//! GET  /admin/breakers               every breaker's status
//! GET  /admin/health                 health report (503 when unhealthy)
//! POST /admin/stats/reset            zero the statistics
//! POST /admin/breakers/{name}/reset  force a breaker CLOSED
//! ```
//!
//! # Design Decisions
//! - Every route requires the bearer token
//! - Handlers only read snapshots; no lock is held across an await

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::lifecycle::Shutdown;
use crate::resilience::Resilience;

#[derive(Clone)]
pub struct AdminState {
    pub resilience: Arc<Resilience>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(resilience: Arc<Resilience>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            resilience,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/health", get(get_health))
        .route("/admin/stats/reset", post(reset_stats))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Bind and serve the admin API until `shutdown` fires.
///
/// Refuses to bind while the configured key is the placeholder.
pub async fn serve(
    resilience: Arc<Resilience>,
    config: &AdminConfig,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    if config.has_placeholder_key() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "admin.api_key is unset; configure a key or disable the admin API",
        ));
    }

    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let state = AdminState::new(resilience, config.api_key.as_str());
    let router = setup_admin_router(state, Duration::from_secs(config.request_timeout_secs));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use std::fmt;
    use tower::ServiceExt;

    use crate::resilience::classifier::Classify;

    const KEY: &str = "test-key";

    #[derive(Debug)]
    struct Down;

    impl fmt::Display for Down {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "service unavailable")
        }
    }

    impl Classify for Down {
        fn status(&self) -> Option<u16> {
            Some(503)
        }
    }

    fn router(resilience: Arc<Resilience>) -> Router {
        setup_admin_router(AdminState::new(resilience, KEY), Duration::from_secs(5))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn fail_once(resilience: &Resilience, policy: &str) {
        let overrides = crate::config::RetryOverrides::default().max_attempts(1);
        let _ = resilience
            .execute_with(policy, &overrides, || async { Err::<(), _>(Down) })
            .await;
    }

    #[tokio::test]
    async fn test_serve_refuses_placeholder_key() {
        let config = AdminConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..AdminConfig::default()
        };
        let err = serve(Arc::new(Resilience::default()), &config, Shutdown::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let config = AdminConfig {
            bind_address: "127.0.0.1:0".to_string(),
            api_key: KEY.to_string(),
            ..AdminConfig::default()
        };
        let shutdown = Shutdown::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { serve(Arc::new(Resilience::default()), &config, shutdown).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let app = router(Arc::new(Resilience::default()));
        let response = app
            .oneshot(Request::get("/admin/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let app = router(Arc::new(Resilience::default()));
        let response = app
            .oneshot(
                Request::get("/admin/stats")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_reflect_calls() {
        let resilience = Arc::new(Resilience::default());
        let _ = resilience
            .execute("default", || async { Ok::<_, Down>(1) })
            .await;

        let response = router(resilience).oneshot(request("GET", "/admin/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["total_calls"], 1);
        assert_eq!(body["successful_calls"], 1);
    }

    #[tokio::test]
    async fn test_health_is_503_when_failure_rate_high() {
        let resilience = Arc::new(Resilience::default());
        fail_once(&resilience, "default").await;

        let response = router(resilience).oneshot(request("GET", "/admin/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(response).await;
        assert_eq!(body["healthy"], false);
        assert_eq!(body["issues"][0]["issue"], "high_failure_rate");
    }

    #[tokio::test]
    async fn test_health_is_200_when_idle() {
        let response = router(Arc::new(Resilience::default()))
            .oneshot(request("GET", "/admin/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_stats_zeroes_counters() {
        let resilience = Arc::new(Resilience::default());
        fail_once(&resilience, "default").await;

        let response = router(resilience.clone())
            .oneshot(request("POST", "/admin/stats/reset"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(resilience.error_stats().total_calls, 0);
    }

    #[tokio::test]
    async fn test_breakers_lists_known_breakers() {
        let resilience = Arc::new(Resilience::default());
        fail_once(&resilience, "database").await;

        let response = router(resilience).oneshot(request("GET", "/admin/breakers")).await.unwrap();
        let body = json(response).await;
        assert_eq!(body[0]["name"], "database");
        assert_eq!(body[0]["state"], "CLOSED");
        assert_eq!(body[0]["failure_count"], 1);
    }

    #[tokio::test]
    async fn test_reset_breaker() {
        let resilience = Arc::new(Resilience::default());
        for _ in 0..3 {
            fail_once(&resilience, "database").await;
        }
        assert_eq!(
            resilience.breaker("database").state(),
            crate::resilience::circuit_breaker::CircuitState::Open
        );

        let app = router(resilience.clone());
        let response = app
            .clone()
            .oneshot(request("POST", "/admin/breakers/database/reset"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["state"], "CLOSED");

        let missing = app
            .oneshot(request("POST", "/admin/breakers/nope/reset"))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
