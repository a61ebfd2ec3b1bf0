//! HTTP client for the remote rendering service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{Client, StatusCode, Url, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    application::fragments::{FragmentError, FragmentSource},
    config::RendererSettings,
    domain::fragments::{BatchItem, FragmentRequest, RenderedFragment, ResolvedFragments},
};

use super::error::InfraError;

const TARGET: &str = "prerender::renderer";

pub const METRIC_FRAGMENT_REQUESTS: &str = "prerender_fragment_requests_total";
pub const METRIC_FRAGMENT_ERRORS: &str = "prerender_fragment_errors_total";
pub const METRIC_FRAGMENT_ITEM_FAILURES: &str = "prerender_fragment_item_failures_total";
pub const METRIC_FRAGMENT_REQUEST_MS: &str = "prerender_fragment_request_ms";

const RENDER_PATH: &str = "render";
const RENDER_BATCH_PATH: &str = "render-batch";
const HEALTH_PATH: &str = "healthz";

#[derive(Serialize)]
struct BatchRequestBody<'a> {
    components: &'a [FragmentRequest],
}

#[derive(Deserialize)]
struct RenderResponseBody {
    html: String,
    #[serde(default)]
    cached: Option<bool>,
    #[serde(default)]
    ms: Option<Value>,
}

#[derive(Deserialize)]
struct BatchResponseBody {
    results: Vec<BatchItemBody>,
}

#[derive(Deserialize)]
struct BatchItemBody {
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    cached: Option<bool>,
    #[serde(default)]
    ms: Option<Value>,
}

impl From<BatchItemBody> for BatchItem {
    fn from(body: BatchItemBody) -> Self {
        BatchItem {
            tag: body.tag.unwrap_or_default(),
            html: body.html.unwrap_or_default(),
            error: body.error.unwrap_or_default(),
            cached: body.cached.unwrap_or(false),
            elapsed_ms: elapsed_label(body.ms),
        }
    }
}

/// The service reports render time as a string; accept a bare number as well.
fn elapsed_label(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Shared client for the rendering service. One instance serves every page request so the
/// underlying connection pool is reused.
#[derive(Clone, Debug)]
pub struct HttpFragmentClient {
    client: Client,
    render_url: Url,
    batch_url: Url,
    health_url: Url,
    timeout: Duration,
}

impl HttpFragmentClient {
    pub fn new(settings: &RendererSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        let base = settings.endpoint.clone();
        let join = |path: &str| {
            base.join(path).map_err(|err| {
                InfraError::configuration(format!("invalid renderer endpoint `{base}`: {err}"))
            })
        };

        Ok(Self {
            render_url: join(RENDER_PATH)?,
            batch_url: join(RENDER_BATCH_PATH)?,
            health_url: join(HEALTH_PATH)?,
            client,
            timeout: settings.timeout,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("prerender/", env!("CARGO_PKG_VERSION"))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn post_json<B, T>(&self, url: &Url, body: &B) -> Result<T, FragmentError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FragmentError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|err| FragmentError::Decode(err.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> FragmentError {
    if err.is_timeout() {
        FragmentError::timeout(err.to_string())
    } else {
        FragmentError::transport(err.to_string())
    }
}

fn record_failure(mode: &'static str, err: &FragmentError) {
    counter!(METRIC_FRAGMENT_ERRORS, "mode" => mode, "kind" => err.kind()).increment(1);
}

#[async_trait]
impl FragmentSource for HttpFragmentClient {
    async fn fetch_fragment(
        &self,
        request: &FragmentRequest,
    ) -> Result<RenderedFragment, FragmentError> {
        let started_at = Instant::now();
        counter!(METRIC_FRAGMENT_REQUESTS, "mode" => "single").increment(1);

        let result: Result<RenderResponseBody, FragmentError> =
            self.post_json(&self.render_url, request).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(METRIC_FRAGMENT_REQUEST_MS, "mode" => "single")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(body) => {
                debug!(
                    target = TARGET,
                    op = "renderer::fetch_fragment",
                    result = "ok",
                    tag = request.tag(),
                    elapsed_ms,
                    html_bytes = body.html.len(),
                    "Fragment rendered"
                );
                Ok(RenderedFragment {
                    tag: request.tag().to_string(),
                    html: body.html,
                    cached: body.cached.unwrap_or(false),
                    elapsed_ms: elapsed_label(body.ms),
                })
            }
            Err(err) => {
                record_failure("single", &err);
                warn!(
                    target = TARGET,
                    op = "renderer::fetch_fragment",
                    result = "error",
                    error_code = err.kind(),
                    tag = request.tag(),
                    elapsed_ms,
                    error = %err,
                    "Fragment request failed"
                );
                Err(err)
            }
        }
    }

    async fn fetch_fragment_batch(
        &self,
        requests: &[FragmentRequest],
    ) -> Result<ResolvedFragments, FragmentError> {
        if requests.is_empty() {
            return Ok(ResolvedFragments::empty());
        }

        let started_at = Instant::now();
        counter!(METRIC_FRAGMENT_REQUESTS, "mode" => "batch").increment(1);

        let body = BatchRequestBody {
            components: requests,
        };
        let result: Result<BatchResponseBody, FragmentError> =
            self.post_json(&self.batch_url, &body).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(METRIC_FRAGMENT_REQUEST_MS, "mode" => "batch")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                record_failure("batch", &err);
                warn!(
                    target = TARGET,
                    op = "renderer::fetch_fragment_batch",
                    result = "error",
                    error_code = err.kind(),
                    count = requests.len(),
                    elapsed_ms,
                    error = %err,
                    "Fragment batch request failed"
                );
                return Err(err);
            }
        };

        let items = response.results.into_iter().map(BatchItem::from).collect();
        let resolved = ResolvedFragments::correlate(requests, items);

        if let Some(mismatch) = resolved.count_mismatch() {
            warn!(
                target = TARGET,
                op = "renderer::fetch_fragment_batch",
                result = "count_mismatch",
                expected = mismatch.expected,
                received = mismatch.received,
                "Batch response length differs from request; results truncated"
            );
        }
        for index in resolved.tag_mismatches() {
            warn!(
                target = TARGET,
                op = "renderer::fetch_fragment_batch",
                result = "tag_mismatch",
                slot = index,
                expected = requests[*index].tag(),
                "Batch result names a different tag; correlated by position"
            );
        }

        let failed = resolved.failures().count();
        if failed > 0 {
            counter!(METRIC_FRAGMENT_ITEM_FAILURES).increment(failed as u64);
        }

        debug!(
            target = TARGET,
            op = "renderer::fetch_fragment_batch",
            result = "ok",
            count = requests.len(),
            failed,
            elapsed_ms,
            "Fragment batch rendered"
        );

        Ok(resolved)
    }

    async fn health(&self) -> Result<(), FragmentError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(FragmentError::UpstreamStatus {
                status: status.as_u16(),
            }),
        }
    }
}
