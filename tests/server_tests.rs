//! # HTTP API Tests
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot` and
//! hand-built multipart bodies.

mod test_helpers;

#[cfg(test)]
mod tests {
    use crate::test_helpers::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use ocr_batch::config::BatchConfig;
    use ocr_batch::server::{self, AppState};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr-batch-test-boundary";

    fn app(engine: Arc<ScriptedEngine>, config: BatchConfig, max_upload_bytes: usize) -> Router {
        let service = batch_service(engine, config);
        server::router(AppState::new(Arc::new(service)), max_upload_bytes)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn batch_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/batch")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Health endpoint answers with a static status document
    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app(Arc::new(ScriptedEngine::new()), BatchConfig::default(), 1024);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    /// A batch upload returns per-file results in upload order
    #[tokio::test]
    async fn test_batch_upload() {
        let engine = Arc::new(ScriptedEngine::new().with_text(1, "Hola mundo"));
        let app = app(engine.clone(), batch_config(2, 5), 1024 * 1024);

        let body = multipart_body(&[
            ("files", Some("first.png"), png_bytes(1, 4)),
            ("files", Some("second.png"), png_bytes(2, 4)),
            ("comment", None, b"ignored".to_vec()),
            ("files", Some("broken.png"), b"\x89PNG but not really".to_vec()),
        ]);
        let response = app.oneshot(batch_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["total_files"], 3);
        assert_eq!(json["success_count"], 2);
        assert_eq!(json["failure_count"], 1);
        assert!(json["processing_time"].as_str().is_some());

        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0]["filename"], "first.png");
        assert_eq!(results[0]["success"], true);
        assert_eq!(results[0]["preview"], expected_text(0));
        assert_eq!(results[0]["lines"], 1);

        assert_eq!(results[1]["filename"], "second.png");
        assert_eq!(results[1]["preview"], "Hola mundo");
        assert_eq!(results[1]["lines"], 2);

        assert_eq!(results[2]["filename"], "broken.png");
        assert_eq!(results[2]["success"], false);
        assert_eq!(results[2]["error_category"], "decode-error");
        assert!(results[2]["error"].as_str().is_some());

        assert_eq!(engine.calls(), 2);
    }

    /// A form without `files` parts is rejected
    #[tokio::test]
    async fn test_no_files_uploaded() {
        let app = app(Arc::new(ScriptedEngine::new()), BatchConfig::default(), 1024);

        let body = multipart_body(&[("comment", None, b"hello".to_vec())]);
        let response = app.oneshot(batch_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No files uploaded");
    }

    /// A body that is not multipart is rejected
    #[tokio::test]
    async fn test_unparseable_form() {
        let app = app(Arc::new(ScriptedEngine::new()), BatchConfig::default(), 1024);

        let request = Request::builder()
            .method("POST")
            .uri("/api/batch")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Failed to parse form");
    }

    /// Uploads larger than the configured body limit are rejected
    #[tokio::test]
    async fn test_upload_size_limit() {
        let engine = Arc::new(ScriptedEngine::new());
        let app = app(engine.clone(), BatchConfig::default(), 256);

        let body = multipart_body(&[("files", Some("big.png"), vec![0u8; 4096])]);
        assert!(body.len() > 256);
        let response = app.oneshot(batch_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(engine.calls(), 0);
    }

    /// Exceeding the configured file count is reported as a client error
    #[tokio::test]
    async fn test_too_many_files() {
        let config = BatchConfig {
            max_files: 1,
            ..Default::default()
        };
        let app = app(Arc::new(ScriptedEngine::new()), config, 1024 * 1024);

        let body = multipart_body(&[
            ("files", Some("a.png"), png_bytes(1, 4)),
            ("files", Some("b.png"), png_bytes(2, 4)),
        ]);
        let response = app.oneshot(batch_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("Too many files"));
    }
}
