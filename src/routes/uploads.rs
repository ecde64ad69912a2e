use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload_file))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Keep a client file name safe to use as a path component.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        if bytes.len() > state.config.uploads.max_bytes {
            return Err(AppError::BadRequest("File is too large".to_string()));
        }

        let file_name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize_file_name(&original));
        let dir = PathBuf::from(&state.config.uploads.dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        tokio::fs::write(dir.join(&file_name), &bytes)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        tracing::info!(file = %file_name, size = bytes.len(), "Stored upload");
        return Ok(Json(UploadResponse {
            url: format!("{}/uploads/{}", state.config.server.public_url, file_name),
        }));
    }

    Err(AppError::BadRequest("Missing file field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{send, test_state};
    use axum::body::Body;
    use http::{Method, Request, StatusCode};

    fn multipart_request(field: &str, file_name: &str, content: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: image/png\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            f = field,
            n = file_name,
            c = content
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/upload")
            .header(
                http::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my pic (1).jpg"), "my_pic__1_.jpg");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[tokio::test]
    async fn stores_file_and_returns_public_url() {
        let state = test_state().await;
        let (status, body) = send(&state, multipart_request("file", "logo.png", "PNGDATA")).await;
        assert_eq!(status, StatusCode::OK);

        let url = body["url"].as_str().unwrap();
        let prefix = format!("{}/uploads/", state.config.server.public_url);
        assert!(url.starts_with(&prefix));
        assert!(url.ends_with("-logo.png"));

        let name = url.trim_start_matches(&prefix);
        let stored = std::fs::read_to_string(PathBuf::from(&state.config.uploads.dir).join(name)).unwrap();
        assert_eq!(stored, "PNGDATA");
        let _ = std::fs::remove_dir_all(&state.config.uploads.dir);
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let state = test_state().await;
        let (status, _) = send(&state, multipart_request("other", "x.png", "data")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
