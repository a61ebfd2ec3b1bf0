//! Fragment requests and the outcomes the rendering service reports for them.
//!
//! A batch result is stored per request slot, in request order. The position is the only
//! reliable correlation key: the same tag may be requested more than once on a page.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::DomainError;

/// Reason recorded for request slots the rendering service did not answer.
pub const MISSING_FROM_BATCH: &str = "missing from batch response";

/// One named UI component to render, with the props it is rendered with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentRequest {
    tag: String,
    props: Map<String, Value>,
}

impl FragmentRequest {
    pub fn new(tag: impl Into<String>, props: Map<String, Value>) -> Result<Self, DomainError> {
        let tag = tag.into();
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("fragment tag must not be empty"));
        }

        Ok(Self {
            tag: trimmed.to_string(),
            props,
        })
    }

    /// Request a fragment without props.
    pub fn bare(tag: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(tag, Map::new())
    }

    /// Attach one prop, serializing the value to JSON.
    pub fn with_prop(
        mut self,
        key: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.props.insert(key.into(), value);
        Ok(self)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn props(&self) -> &Map<String, Value> {
        &self.props
    }
}

/// Markup returned by the rendering service for a single fragment.
///
/// The HTML is trusted: the rendering service escapes user content before returning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    pub tag: String,
    pub html: String,
    pub cached: bool,
    pub elapsed_ms: Option<String>,
}

/// A fragment the rendering service reported as failed inside an otherwise successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFailure {
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    Rendered(RenderedFragment),
    Failed(FragmentFailure),
}

impl FragmentOutcome {
    pub fn tag(&self) -> &str {
        match self {
            FragmentOutcome::Rendered(fragment) => &fragment.tag,
            FragmentOutcome::Failed(failure) => &failure.tag,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            FragmentOutcome::Rendered(fragment) => Some(&fragment.html),
            FragmentOutcome::Failed(_) => None,
        }
    }
}

/// A batch item as it appears on the wire, before correlation with its request slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchItem {
    pub tag: String,
    pub html: String,
    pub error: String,
    pub cached: bool,
    pub elapsed_ms: Option<String>,
}

impl BatchItem {
    /// A non-empty error wins; anything else is a render, possibly with empty content.
    fn into_outcome(self, tag: &str) -> FragmentOutcome {
        if self.error.is_empty() {
            FragmentOutcome::Rendered(RenderedFragment {
                tag: tag.to_string(),
                html: self.html,
                cached: self.cached,
                elapsed_ms: self.elapsed_ms,
            })
        } else {
            FragmentOutcome::Failed(FragmentFailure {
                tag: tag.to_string(),
                reason: self.error,
            })
        }
    }
}

/// Difference between the number of requested fragments and the number of results received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountMismatch {
    pub expected: usize,
    pub received: usize,
}

/// Outcome of a batch render, one entry per request slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFragments {
    slots: Vec<FragmentOutcome>,
    count_mismatch: Option<CountMismatch>,
    tag_mismatches: Vec<usize>,
}

impl ResolvedFragments {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pair response items with request slots by position.
    ///
    /// Extra items are dropped. Slots without an item are recorded as failed with
    /// [`MISSING_FROM_BATCH`], and the mismatch is kept for the caller to inspect.
    pub fn correlate(requests: &[FragmentRequest], items: Vec<BatchItem>) -> Self {
        let received = items.len();
        let count_mismatch = (received != requests.len()).then_some(CountMismatch {
            expected: requests.len(),
            received,
        });

        let mut tag_mismatches = Vec::new();
        let mut items = items.into_iter();
        let slots = requests
            .iter()
            .enumerate()
            .map(|(index, request)| match items.next() {
                Some(item) => {
                    if !item.tag.is_empty() && item.tag != request.tag() {
                        tag_mismatches.push(index);
                    }
                    item.into_outcome(request.tag())
                }
                None => FragmentOutcome::Failed(FragmentFailure {
                    tag: request.tag().to_string(),
                    reason: MISSING_FROM_BATCH.to_string(),
                }),
            })
            .collect();

        Self {
            slots,
            count_mismatch,
            tag_mismatches,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FragmentOutcome] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&FragmentOutcome> {
        self.slots.get(index)
    }

    pub fn html_at(&self, index: usize) -> Option<&str> {
        self.slot(index).and_then(FragmentOutcome::html)
    }

    /// HTML of the last successfully rendered slot with this tag.
    pub fn html(&self, tag: &str) -> Option<&str> {
        self.slots
            .iter()
            .rev()
            .filter(|outcome| outcome.tag() == tag)
            .find_map(FragmentOutcome::html)
    }

    /// Tag-keyed view of the successful slots; a repeated tag keeps its last success.
    pub fn to_tag_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(self.slots.len());
        for outcome in &self.slots {
            if let FragmentOutcome::Rendered(fragment) = outcome {
                map.insert(fragment.tag.clone(), fragment.html.clone());
            }
        }
        map
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &FragmentFailure)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                FragmentOutcome::Failed(failure) => Some((index, failure)),
                FragmentOutcome::Rendered(_) => None,
            })
    }

    pub fn count_mismatch(&self) -> Option<CountMismatch> {
        self.count_mismatch
    }

    /// Slots whose response item named a different tag than the request.
    pub fn tag_mismatches(&self) -> &[usize] {
        &self.tag_mismatches
    }
}
