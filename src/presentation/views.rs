use crate::application::error::HttpError;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Clone, Debug)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
    pub canonical: String,
}

#[derive(Clone, Debug)]
pub struct LayoutContext<T> {
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(meta: PageMetaView, content: T) -> Self {
        Self { meta, content }
    }
}

/// Home page content. Widget fields hold trusted fragment HTML.
#[derive(Clone, Debug)]
pub struct HomeView {
    pub message: String,
    pub widget_html: String,
    pub widget_ssr_html: String,
}

/// Dashboard content. Greeting fields hold trusted fragment HTML, possibly empty or a
/// client-side placeholder when the batch reported a failure for that slot.
#[derive(Clone, Debug)]
pub struct DashboardView {
    pub alice_html: String,
    pub bob_html: String,
    pub degraded: Vec<String>,
}

impl DashboardView {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeView>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub view: LayoutContext<DashboardView>,
}
