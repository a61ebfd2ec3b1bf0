//! The concrete pages served by this process, expressed as fragment slots.

use axum::http::StatusCode;
use url::Url;

use crate::{
    application::{
        assembler::{AssemblyError, FragmentSlot, PageAssembler},
        error::HttpError,
        fragments::FragmentError,
    },
    domain::fragments::FragmentRequest,
    presentation::views::{DashboardView, HomeView, LayoutContext, PageMetaView},
};

const SOURCE: &str = "application::pages::PageService";

const HELLO_WIDGET: &str = "hello-widget";
const SSR_HELLO_WIDGET: &str = "ssr-hello-widget";

const HOME_TITLE: &str = "SSR + Web Component Demo";
const HOME_DESCRIPTION: &str = "A page assembled from server-rendered web components.";
const HOME_MESSAGE: &str = "Hello, World!";
const DASHBOARD_TITLE: &str = "Dashboard";
const DASHBOARD_DESCRIPTION: &str = "Greetings rendered in a single batch.";

#[derive(Clone)]
pub struct PageService {
    assembler: PageAssembler,
    public_url: Url,
}

impl PageService {
    pub fn new(assembler: PageAssembler, public_url: Url) -> Self {
        Self {
            assembler,
            public_url,
        }
    }

    /// Home page: each widget is fetched with its own call.
    pub async fn home(&self) -> Result<LayoutContext<HomeView>, HttpError> {
        let slots = [
            slot(
                "widget",
                HELLO_WIDGET,
                &[("message", "Hello from Web Component!")],
            )?,
            slot(
                "widget_ssr",
                SSR_HELLO_WIDGET,
                &[("message", "Hello from SSR Web Component!")],
            )?,
        ];

        let mut fragments = self.assembler.assemble_each(&slots).await?;

        Ok(LayoutContext::new(
            self.meta(HOME_TITLE, HOME_DESCRIPTION, "/"),
            HomeView {
                message: HOME_MESSAGE.to_string(),
                widget_html: fragments.take("widget"),
                widget_ssr_html: fragments.take("widget_ssr"),
            },
        ))
    }

    /// Dashboard: both greetings are fetched in one batch under the configured
    /// missing-fragment policy.
    pub async fn dashboard(&self) -> Result<LayoutContext<DashboardView>, HttpError> {
        let slots = [
            slot("alice", SSR_HELLO_WIDGET, &[("name", "Alice")])?,
            slot("bob", SSR_HELLO_WIDGET, &[("name", "Bob")])?,
        ];

        let mut fragments = self.assembler.assemble_batch(&slots).await?;
        let degraded = fragments.degraded().to_vec();

        Ok(LayoutContext::new(
            self.meta(DASHBOARD_TITLE, DASHBOARD_DESCRIPTION, "/dashboard"),
            DashboardView {
                alice_html: fragments.take("alice"),
                bob_html: fragments.take("bob"),
                degraded,
            },
        ))
    }

    fn meta(&self, title: &str, description: &str, path: &str) -> PageMetaView {
        PageMetaView {
            title: title.to_string(),
            description: description.to_string(),
            canonical: canonical_url(&self.public_url, path),
        }
    }
}

fn slot(name: &str, tag: &str, props: &[(&str, &str)]) -> Result<FragmentSlot, HttpError> {
    let mut request = FragmentRequest::bare(tag).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid page definition",
            &err,
        )
    })?;

    for (key, value) in props {
        request = request.with_prop(*key, value).map_err(|err| {
            HttpError::from(AssemblyError::Fragment {
                slot: name.to_string(),
                tag: tag.to_string(),
                source: FragmentError::from(err),
            })
        })?;
    }

    Ok(FragmentSlot::new(name, request))
}

pub(crate) fn canonical_url(base: &Url, path: &str) -> String {
    let root = format!("{}/", base.as_str().trim_end_matches('/'));
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        root
    } else {
        format!("{root}{trimmed}")
    }
}
