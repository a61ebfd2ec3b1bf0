//! The `render` command: fetch fragments through a [`FragmentSource`] and write their HTML.

use std::io::Write;

use serde_json::{Map, Value};

use crate::{
    application::{error::AppError, fragments::FragmentSource},
    domain::fragments::{FragmentOutcome, FragmentRequest},
    infra::error::InfraError,
};

/// Which endpoint a render invocation goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Single,
    Batch,
}

impl RenderMode {
    /// One tag uses the single endpoint unless a batch is forced; several tags always batch.
    pub fn select(tag_count: usize, force_batch: bool) -> Self {
        if !force_batch && tag_count == 1 {
            RenderMode::Single
        } else {
            RenderMode::Batch
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub failed: usize,
}

/// Parse `--props`; only a JSON object is accepted.
pub fn parse_props(raw: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::validation("--props must be a JSON object")),
        Err(err) => Err(AppError::validation(format!(
            "--props is not valid JSON: {err}"
        ))),
    }
}

/// One request per tag, each carrying the same props.
pub fn build_requests(
    tags: &[String],
    props: &Map<String, Value>,
) -> Result<Vec<FragmentRequest>, AppError> {
    tags.iter()
        .map(|tag| FragmentRequest::new(tag.as_str(), props.clone()).map_err(AppError::from))
        .collect()
}

/// Write rendered HTML to `out`, one fragment per line, in request order. Fragments the
/// rendering service reported as failed go to `diagnostics` as HTML comments.
pub async fn render_fragments<O, D>(
    source: &dyn FragmentSource,
    requests: &[FragmentRequest],
    mode: RenderMode,
    out: &mut O,
    diagnostics: &mut D,
) -> Result<RenderSummary, AppError>
where
    O: Write,
    D: Write,
{
    let mut summary = RenderSummary::default();

    match mode {
        RenderMode::Single => {
            for request in requests {
                let fragment = source.fetch_fragment(request).await?;
                writeln!(out, "{}", fragment.html).map_err(io_error)?;
                summary.rendered += 1;
            }
        }
        RenderMode::Batch => {
            let resolved = source.fetch_fragment_batch(requests).await?;
            for outcome in resolved.slots() {
                match outcome {
                    FragmentOutcome::Rendered(fragment) => {
                        writeln!(out, "{}", fragment.html).map_err(io_error)?;
                        summary.rendered += 1;
                    }
                    FragmentOutcome::Failed(failure) => {
                        writeln!(
                            diagnostics,
                            "<!-- {} failed: {} -->",
                            failure.tag, failure.reason
                        )
                        .map_err(io_error)?;
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    out.flush().map_err(io_error)?;
    Ok(summary)
}

fn io_error(err: std::io::Error) -> AppError {
    AppError::from(InfraError::from(err))
}
