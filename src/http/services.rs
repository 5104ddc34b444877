use std::{any::Any, path::Path, sync::Arc};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    handler::HandlerWithoutStateExt,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    constants::SERVICE_NAME,
    core::{domain::ExecutionRequest, pipeline::executing::Pipeline},
    http::{
        errors::ApiError,
        models::{ExecuteRequest, ExecuteResponse, HealthResponse},
    },
};

#[derive(Clone, Debug)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Builds the full HTTP surface around `pipeline`.
///
/// Paths outside of `/api` are served from `static_dir` when one is given;
/// anything left unmatched gets the JSON 404.
pub fn router(pipeline: Arc<Pipeline>, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/execute", post(execute))
        .route("/api/health", get(health))
        .with_state(AppState { pipeline });

    let router = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir).fallback(not_found.into_service())),
        None => api.fallback(not_found),
    };

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tracing::instrument(skip_all)]
async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let code = match payload {
        Ok(Json(body)) => body.code,
        Err(rejection) => {
            tracing::debug!("Rejected request body: {}", rejection);
            None
        }
    };

    let request = ExecutionRequest::from_code(code)?;
    tracing::info!(request_id = %request.id, "Received execution request");

    let result = state.pipeline.run(request).await?;
    Ok(Json(result.into()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(message = "request handler panicked", panic = %details);

    ApiError::Internal.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        domain::{ExecutionLimits, ExecutionOutcome},
        traits::executor::MockExecutor,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(executor: MockExecutor) -> Router {
        let pipeline = Pipeline::new(
            Arc::new(executor),
            ExecutionLimits {
                time: Duration::from_secs(10),
                output_chars: 5000,
            },
        );
        router(Arc::new(pipeline), None)
    }

    fn execute_request(body: &str) -> Request<Body> {
        Request::post("/api/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn unused_executor() -> MockExecutor {
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(0);
        executor
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::get("/api/health").body(Body::empty()).unwrap();

        let (status, body) = send(app(unused_executor()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "healthy",
                "service": "pyrunner",
                "version": env!("CARGO_PKG_VERSION"),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let request = Request::get("/api/unknown").body(Body::empty()).unwrap();

        let (status, body) = send(app(unused_executor()), request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "not found"}));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let requests = vec![
            execute_request("{}"),
            execute_request("not json"),
            execute_request(r#"{"code": 42}"#),
            Request::post("/api/execute").body(Body::empty()).unwrap(),
        ];

        for request in requests {
            let (status, body) = send(app(unused_executor()), request).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"success": false, "error": "code is required"}));
        }
    }

    #[tokio::test]
    async fn test_empty_code() {
        for code in ["", "   "] {
            let request = execute_request(&json!({ "code": code }).to_string());

            let (status, body) = send(app(unused_executor()), request).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                body,
                json!({"success": false, "error": "code must not be empty"})
            );
        }
    }

    #[tokio::test]
    async fn test_disallowed_code() {
        let request = execute_request(&json!({ "code": "import os\nprint(1)" }).to_string());

        let (status, body) = send(app(unused_executor()), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"success": false, "error": "disallowed operation: import os"})
        );
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .withf(|code, _| code == "print('hi')")
            .times(1)
            .return_const(ExecutionOutcome::Completed {
                stdout: "hi\n".to_string(),
                stderr: String::new(),
                return_code: Some(0),
                elapsed: Duration::from_millis(31),
            });
        let request = execute_request(&json!({ "code": "  print('hi')  " }).to_string());

        let (status, body) = send(app(executor), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "stdout": "hi\n",
                "stderr": "",
                "execution_time": 0.031,
                "return_code": 0,
            })
        );
    }

    #[tokio::test]
    async fn test_timed_out_execution_is_ok_response() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .return_const(ExecutionOutcome::TimedOut {
                elapsed: Duration::from_secs(10),
            });
        let request = execute_request(&json!({ "code": "while True: pass" }).to_string());

        let (status, body) = send(app(executor), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("execution exceeded time limit of 10s"));
        assert_eq!(body["execution_time"], json!(10.0));
    }

    #[tokio::test]
    async fn test_executor_panic_is_internal_error() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .returning(|_, _| panic!("executor exploded"));
        let request = execute_request(&json!({ "code": "print(1)" }).to_string());

        let (status, body) = send(app(executor), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"success": false, "error": "internal server error"})
        );
    }

    #[tokio::test]
    async fn test_static_dir_served_with_json_fallback() {
        let dir = std::env::temp_dir().join(format!("pyrunner_static_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>pyrunner</h1>").unwrap();
        let pipeline = Pipeline::new(
            Arc::new(unused_executor()),
            ExecutionLimits {
                time: Duration::from_secs(10),
                output_chars: 5000,
            },
        );
        let app = router(Arc::new(pipeline), Some(&dir));

        let response = app
            .clone()
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::get("/missing.js").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "not found"}));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
