//! Static asset serving from the configured directory.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::Mime;

use crate::application::error::ErrorReport;

const SOURCE: &str = "infra::assets::serve_from_dir";

/// Serve one file below `root`. Directory paths and anything escaping `root` are 404s.
pub async fn serve_from_dir(root: &Path, path: &str) -> Response {
    let Some(relative) = sanitize(path) else {
        return not_found_response();
    };

    let full = root.join(&relative);
    match tokio::fs::read(&full).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&relative).first_or_octet_stream();
            build_response(Bytes::from(contents), mime)
        }
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            not_found_response()
        }
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Reduce a request path to plain relative components.
fn sanitize(path: &str) -> Option<PathBuf> {
    let candidate = path.trim_start_matches('/');
    if candidate.is_empty() || candidate.ends_with('/') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(candidate).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal_and_directories() {
        assert_eq!(sanitize(""), None);
        assert_eq!(sanitize("js/"), None);
        assert_eq!(sanitize("../secret.txt"), None);
        assert_eq!(sanitize("js/../../secret.txt"), None);
        assert_eq!(sanitize("./app.js"), None);
        assert_eq!(
            sanitize("/js/app.js"),
            Some(PathBuf::from("js").join("app.js"))
        );
    }

    #[tokio::test]
    async fn serves_files_with_guessed_mime() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("static");
        let response = serve_from_dir(&root, "hello-widget.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.contains("javascript"));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("static");
        let response = serve_from_dir(&root, "nope.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
