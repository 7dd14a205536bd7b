pub mod auth;
pub mod config;
pub mod handlers;
pub mod server;

pub use config::EiConfig;
pub use server::run_server;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<ocr_job::JobService>,
    pub access_key: Arc<str>,
    pub secret: Arc<str>,
}

impl AppState {
    pub fn new(jobs: Arc<ocr_job::JobService>, access_key: String, secret: String) -> Self {
        Self {
            jobs,
            access_key: Arc::from(access_key),
            secret: Arc::from(secret),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ocr_job::JobService;
    use ocr_store::{MemoryStore, Store};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn service() -> Arc<JobService> {
        Arc::new(JobService::new(
            Arc::new(MemoryStore::new()) as Arc<dyn Store>,
            "k1".to_string(),
            ocr_job::bridge::WebhookConfig::with_defaults(
                "http://localhost".to_string(),
                "k".to_string(),
                "s".to_string(),
            ),
            Box::new(|_, _| Err(ocr_types::OcrError::internal("no peer in test"))),
            Box::new(|_, _, _, _, _| Err(ocr_types::OcrError::internal("no participant in test"))),
        ))
    }

    fn state() -> AppState {
        AppState::new(service(), "key".to_string(), "secret".to_string())
    }

    fn public_router(state: AppState) -> axum::Router {
        use axum::middleware;
        use axum::routing::{delete, get, post};
        axum::Router::new()
            .route("/jobs", post(handlers::create_job))
            .route("/jobs/:job_id", delete(handlers::delete_job))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_credentials,
            ))
            .route("/health", get(handlers::health))
            .with_state(state)
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let app = public_router(state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_job_rejects_missing_credentials() {
        let app = public_router(state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_job_rejects_malformed_json_once_authenticated() {
        let app = public_router(state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs")
                    .header("content-type", "application/json")
                    .header("x-chainlink-ea-accesskey", "key")
                    .header("x-chainlink-ea-secret", "secret")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
