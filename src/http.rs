//! HTTP status surface.
//!
//! A read-only endpoint polled by whatever presentation layer fronts the
//! service. Reports the executor state as JSON plus a rendered summary
//! line.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::state::{ExecutorState, StatusReporter};

#[derive(Debug, Serialize)]
struct StatusPayload {
    summary: String,
    #[serde(flatten)]
    state: ExecutorState,
}

/// Build the status router.
pub fn status_routes(reporter: StatusReporter) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(current_status))
        .layer(CorsLayer::permissive())
        .with_state(reporter)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn current_status(State(reporter): State<StatusReporter>) -> impl IntoResponse {
    let state = reporter.current_status().await;
    Json(StatusPayload {
        summary: match &state {
            ExecutorState::Idle => "Currently idle...".to_string(),
            other => format!("Currently {other}"),
        },
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::queue::Tier;
    use crate::state::Scheduler;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = status_routes(StatusReporter::new(Scheduler::new()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_idle() {
        let app = status_routes(StatusReporter::new(Scheduler::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["state"], "idle");
        assert_eq!(json["summary"], "Currently idle...");
    }

    #[tokio::test]
    async fn status_reports_running_job() {
        let scheduler = Scheduler::new();
        scheduler
            .submit("alice", "foo.yaml", Tier::Normal)
            .await
            .unwrap();
        scheduler.begin_next_job().await.unwrap();

        let app = status_routes(StatusReporter::new(Arc::clone(&scheduler)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["state"], "running");
        assert_eq!(json["label"], "running: foo");
        assert!(json["summary"].as_str().unwrap().starts_with("Currently running: foo"));
    }
}
