//! `GET/POST /postman/file/{*path}` -- static file serving and uploads
//! for the optional file API.

use std::net::SocketAddr;
use std::path::{Component, PathBuf};

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequest, Multipart, OriginalUri, Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::AppState;
use crate::error::FileServeError;
use crate::protocol::ResultMessage;

/// Resolves a URL-encoded path fragment (after `/postman/file/`) into a
/// path rooted at `serve_files_dir`, defaulting to `index.html` and
/// rejecting any `..`/absolute component to prevent escaping the root.
fn resolve_path(serve_files_dir: &std::path::Path, raw: &str) -> Result<PathBuf, FileServeError> {
    let decoded = percent_decode_str(raw).decode_utf8().map_err(|_| FileServeError::InvalidPath)?;
    let requested = if decoded.is_empty() { "index.html" } else { decoded.as_ref() };

    let candidate = PathBuf::from(requested);
    for component in candidate.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(FileServeError::InvalidPath),
        }
    }

    Ok(serve_files_dir.join(candidate))
}

pub async fn file_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    uri: OriginalUri,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    if let Err(e) = state.admission.check_ip(&remote.to_string()) {
        return axum::Json(ResultMessage::fail(e.to_string())).into_response();
    }
    if !state.config.use_file_api {
        return axum::Json(ResultMessage::fail(FileServeError::Disabled.to_string())).into_response();
    }

    let token = uri
        .query()
        .and_then(|q| serde_urlencoded::from_str::<std::collections::HashMap<String, String>>(q).ok())
        .and_then(|m| m.get("token").or_else(|| m.get("tkn")).cloned());
    if let Err(e) = state.admission.check_token(token.as_deref()) {
        return axum::Json(ResultMessage::fail(e.to_string())).into_response();
    }

    if request.method() == axum::http::Method::POST {
        return upload(state, request).await;
    }

    let full_path = match resolve_path(&state.config.serve_files_dir, &path) {
        Ok(p) => p,
        Err(e) => return axum::Json(ResultMessage::fail(e.to_string())).into_response(),
    };

    if !full_path.exists() {
        return axum::Json(ResultMessage::fail(FileServeError::NotFound.to_string())).into_response();
    }

    match ServeFile::new(&full_path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "file serve error").into_response(),
    }
}

async fn upload(state: AppState, request: Request<Body>) -> Response {
    let mut multipart = match Multipart::from_request(request, &state).await {
        Ok(m) => m,
        Err(_) => return axum::Json(ResultMessage::fail(FileServeError::UploadFailed("invalid multipart body".into()).to_string())).into_response(),
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let Ok(data) = field.bytes().await else {
            return axum::Json(ResultMessage::fail(FileServeError::UploadFailed("could not read upload".into()).to_string())).into_response();
        };

        let Ok(dest) = resolve_path(&state.config.serve_files_dir, &filename) else {
            return axum::Json(ResultMessage::fail(FileServeError::InvalidPath.to_string())).into_response();
        };

        if tokio::fs::create_dir_all(&state.config.serve_files_dir).await.is_err() {
            return axum::Json(ResultMessage::fail(FileServeError::UploadFailed("could not create directory".into()).to_string())).into_response();
        }
        if tokio::fs::write(&dest, &data).await.is_err() {
            return axum::Json(ResultMessage::fail(FileServeError::UploadFailed("could not write file".into()).to_string())).into_response();
        }

        return axum::Json(ResultMessage::success()).into_response();
    }

    axum::Json(ResultMessage::fail(FileServeError::UploadFailed("no file field in upload".into()).to_string())).into_response()
}
