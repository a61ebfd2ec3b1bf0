use axum::{Json, Router, routing::get};
use serde::Serialize;

use super::HttpState;

#[derive(Debug, Serialize)]
struct HelloResponse {
    msg: &'static str,
}

pub(super) fn build_api_router() -> Router<HttpState> {
    Router::new().route("/api/hello", get(hello))
}

async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        msg: "Hello from prerender API",
    })
}
