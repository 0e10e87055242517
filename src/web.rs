use anyhow::Result;
use std::sync::Arc;

use crate::handlers::ImageDescriptionClient;
use crate::models::{AnalysisInput, Credential, DisplayUpdate, UploadedImage};

/// Largest upload accepted by the browser surface
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Form field names shared with `static/index.html`
mod fields {
    pub const API_KEY: &str = "api_key";
    pub const IMAGE: &str = "image";
    pub const INCLUDE_CONTEXT: &str = "include_context";
    pub const CONTEXT: &str = "context";
}

fn is_checked(value: &str) -> bool {
    matches!(value.trim(), "on" | "true" | "1")
}

/// Turns the posted form into one analysis attempt. The POST itself is the trigger.
pub async fn read_analysis_form(mut multipart: axum::extract::Multipart) -> Result<AnalysisInput> {
    let mut input = AnalysisInput {
        triggered: true,
        ..AnalysisInput::default()
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            fields::API_KEY => input.credential = Credential::new(field.text().await?),
            fields::INCLUDE_CONTEXT => input.include_context = is_checked(&field.text().await?),
            fields::CONTEXT => input.context = Some(field.text().await?),
            fields::IMAGE => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;

                // Browsers post an empty part when no file was picked
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }

                log::info!("📸 Upload received: {} ({} bytes)", filename, bytes.len());
                input.image = Some(UploadedImage::from_upload(filename, bytes.to_vec())?);
            }
            other => log::debug!("Ignoring unknown form field: {}", other),
        }
    }

    Ok(input)
}

pub mod server {
    use super::*;
    use axum::{
        extract::{DefaultBodyLimit, Multipart, State},
        http::StatusCode,
        response::{
            sse::{Event, KeepAlive, Sse},
            Html,
        },
        routing::{get, post},
        Router,
    };
    use futures_util::{Stream, StreamExt};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tower::ServiceBuilder;
    use tower_http::limit::RequestBodyLimitLayer;

    pub struct AppState {
        pub client: Arc<ImageDescriptionClient>,
    }

    pub fn create_router(client: Arc<ImageDescriptionClient>) -> Router {
        let state = Arc::new(AppState { client });

        Router::new()
            .route("/", get(index_handler))
            .route("/analyze", post(analyze_handler))
            .route("/health", get(health_check))
            .layer(
                ServiceBuilder::new()
                    .layer(DefaultBodyLimit::disable())
                    .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
            )
            .with_state(state)
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        multipart: Multipart,
    ) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
        let input = read_analysis_form(multipart).await.map_err(|e| {
            log::warn!("⚠️ Rejected upload: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

        let (mut tx, rx) = mpsc::unbounded_channel::<DisplayUpdate>();
        let client = state.client.clone();

        // Sender drops when the analysis ends, which closes the event stream
        tokio::spawn(async move {
            client.analyze(&input, &mut tx).await;
        });

        // JSON keeps line breaks in model output inside one data line
        let events = UnboundedReceiverStream::new(rx)
            .map(|update| Event::default().event(update.kind()).json_data(&update));

        Ok(Sse::new(events).keep_alive(KeepAlive::default()))
    }

    async fn index_handler() -> Html<&'static str> {
        Html(include_str!("../static/index.html"))
    }

    async fn health_check() -> &'static str {
        "OK"
    }
}

#[cfg(test)]
mod tests {
    use super::server::create_router;
    use super::*;
    use crate::handlers::ClientSettings;
    use crate::services::{OpenAIConfig, OpenAIConnector};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-IMAGE-DESCRIBER-BOUNDARY";

    fn router_for(base_url: &str) -> axum::Router {
        let connector = OpenAIConnector::new(OpenAIConfig {
            base_url: base_url.to_string(),
            request_timeout: None,
        })
        .unwrap();
        let client = ImageDescriptionClient::new(Arc::new(connector), ClientSettings::default());
        create_router(Arc::new(client))
    }

    fn test_router() -> axum::Router {
        router_for(crate::services::openai::DEFAULT_BASE_URL)
    }

    async fn streamed_events(response: axum::response::Response) -> Vec<serde_json::Value> {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    fn ready_form() -> String {
        multipart_body(&[("api_key", None, "sk-test"), ("image", Some("a.jpg"), "jpegbytes")])
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body
    }

    fn analyze_request(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_index_page_has_upload_form() {
        let response = test_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("name=\"api_key\""));
        assert!(html.contains("accept=\".jpg,.jpeg,.png\""));
    }

    #[tokio::test]
    async fn test_empty_form_streams_both_warnings() {
        let body = multipart_body(&[("api_key", None, ""), ("image", Some(""), "")]);
        let response = test_router().oneshot(analyze_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events = String::from_utf8(body.to_vec()).unwrap();

        assert_eq!(events.matches("event: warning").count(), 2);
        assert!(events.contains("sube una imagen"));
        assert!(events.contains("Ingresa tu API key"));
    }

    #[tokio::test]
    async fn test_streams_partials_then_final_with_line_breaks() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Una\\r\\nflor\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" rosa.\"}}]}\n\n",
                "data: [DONE]\n\n",
            ))
            .create_async()
            .await;

        let response = router_for(&server.url())
            .oneshot(analyze_request(ready_form()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = streamed_events(response).await;
        assert_eq!(
            events,
            vec![
                serde_json::json!({"kind": "partial", "text": "Una\r\nflor▌"}),
                serde_json::json!({"kind": "partial", "text": "Una\r\nflor rosa.▌"}),
                serde_json::json!({"kind": "final", "text": "Una\r\nflor rosa."}),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_failure_ends_with_error_event() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Una\"}}]}\n\n",
                "data: {\"error\":{\"message\":\"Rate limit reached\"}}\n\n",
            ))
            .create_async()
            .await;

        let response = router_for(&server.url())
            .oneshot(analyze_request(ready_form()))
            .await
            .unwrap();

        let events = streamed_events(response).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["kind"], "partial");
        assert_eq!(events[1]["kind"], "error");

        let text = events[1]["text"].as_str().unwrap();
        assert!(text.starts_with("Ocurrió un error: "));
        assert!(text.contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_rejected() {
        let body = multipart_body(&[
            ("api_key", None, "sk-test"),
            ("image", Some("animacion.gif"), "GIF89a"),
        ]);
        let response = test_router().oneshot(analyze_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_toggle_values() {
        assert!(is_checked("on"));
        assert!(is_checked("true"));
        assert!(!is_checked("off"));
        assert!(!is_checked(""));
    }
}
