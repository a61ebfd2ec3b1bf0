use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        error::HttpError, fragments::FragmentSource, pages::PageService, sitemap::SitemapService,
    },
    infra::assets,
    presentation::views::{DashboardTemplate, HomeTemplate, render_template_response},
};

use super::{
    api::build_api_router,
    middleware::{log_responses, set_request_context},
    renderer_health_response,
};

#[derive(Clone)]
pub struct HttpState {
    pub pages: Arc<PageService>,
    pub sitemap: Arc<SitemapService>,
    pub renderer: Arc<dyn FragmentSource>,
    pub static_dir: Arc<PathBuf>,
}

pub fn build_router(state: HttpState) -> Router {
    let page_routes = Router::new()
        .route("/", get(index))
        .route("/dashboard", get(dashboard))
        .route("/sitemap.xml", get(sitemap))
        .route("/robots.txt", get(robots_txt));

    let static_routes = Router::new()
        .route("/_health/renderer", get(renderer_health))
        .route("/static/{*path}", get(serve_static));

    page_routes
        .merge(static_routes)
        .merge(build_api_router())
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(State(state): State<HttpState>) -> Response {
    match state.pages.home().await {
        Ok(view) => render_template_response(HomeTemplate { view }, StatusCode::OK),
        Err(err) => err.into_response(),
    }
}

async fn dashboard(State(state): State<HttpState>) -> Response {
    match state.pages.dashboard().await {
        Ok(view) => render_template_response(DashboardTemplate { view }, StatusCode::OK),
        Err(err) => err.into_response(),
    }
}

async fn sitemap(State(state): State<HttpState>) -> Response {
    typed_response(state.sitemap.sitemap_xml(), "application/xml")
}

async fn robots_txt(State(state): State<HttpState>) -> Response {
    typed_response(state.sitemap.robots_txt(), "text/plain; charset=utf-8")
}

async fn renderer_health(State(state): State<HttpState>) -> Response {
    renderer_health_response(state.renderer.health().await)
}

async fn serve_static(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    assets::serve_from_dir(state.static_dir.as_path(), &path).await
}

async fn not_found() -> Response {
    HttpError::new(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
    .into_response()
}

fn typed_response(body: String, content_type: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
