//! Page assembly: resolve the fragments a page needs before handing them to a template.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use futures::future::join_all;
use thiserror::Error;
use tracing::warn;

use crate::{
    application::fragments::{FragmentError, FragmentSource},
    domain::fragments::{FragmentOutcome, FragmentRequest, MISSING_FROM_BATCH},
};

const TARGET: &str = "prerender::assembler";

/// What to do with a slot whose fragment failed inside an otherwise successful batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingFragmentPolicy {
    /// Leave the slot out; the template renders it as an empty string.
    Omit,
    /// Fill the slot with an empty custom element so the component renders client-side.
    #[default]
    Placeholder,
    /// Fail the page.
    Fail,
}

impl MissingFragmentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingFragmentPolicy::Omit => "omit",
            MissingFragmentPolicy::Placeholder => "placeholder",
            MissingFragmentPolicy::Fail => "fail",
        }
    }
}

impl fmt::Display for MissingFragmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingFragmentPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "omit" => Ok(Self::Omit),
            "placeholder" => Ok(Self::Placeholder),
            "fail" => Ok(Self::Fail),
            other => Err(format!(
                "unknown policy `{other}` (expected omit|placeholder|fail)"
            )),
        }
    }
}

/// A named template slot and the fragment that fills it.
#[derive(Debug, Clone)]
pub struct FragmentSlot {
    pub name: String,
    pub request: FragmentRequest,
}

impl FragmentSlot {
    pub fn new(name: impl Into<String>, request: FragmentRequest) -> Self {
        Self {
            name: name.into(),
            request,
        }
    }
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("fragment `{tag}` for slot `{slot}` failed: {source}")]
    Fragment {
        slot: String,
        tag: String,
        #[source]
        source: FragmentError,
    },
    #[error("fragment batch failed: {0}")]
    Batch(#[source] FragmentError),
    #[error("fragment `{tag}` for slot `{slot}` was not rendered: {reason}")]
    Missing {
        slot: String,
        tag: String,
        reason: String,
    },
}

impl AssemblyError {
    /// The underlying call failure, when there is one.
    pub fn fragment_error(&self) -> Option<&FragmentError> {
        match self {
            AssemblyError::Fragment { source, .. } => Some(source),
            AssemblyError::Batch(source) => Some(source),
            AssemblyError::Missing { .. } => None,
        }
    }
}

/// Resolved HTML keyed by slot name.
#[derive(Debug, Clone, Default)]
pub struct AssembledFragments {
    html: HashMap<String, String>,
    degraded: Vec<String>,
}

impl AssembledFragments {
    /// HTML for a slot; an absent slot reads as the empty string.
    pub fn html(&self, slot: &str) -> &str {
        self.html.get(slot).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.html.contains_key(slot)
    }

    /// Slots that were omitted or replaced by a placeholder.
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    pub fn take(&mut self, slot: &str) -> String {
        self.html.remove(slot).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct PageAssembler {
    fragments: Arc<dyn FragmentSource>,
    policy: MissingFragmentPolicy,
}

impl PageAssembler {
    pub fn new(fragments: Arc<dyn FragmentSource>, policy: MissingFragmentPolicy) -> Self {
        Self { fragments, policy }
    }

    pub fn policy(&self) -> MissingFragmentPolicy {
        self.policy
    }

    /// Fetch every slot with its own call, concurrently.
    ///
    /// Every call runs to completion under its own deadline; a failure never cancels its
    /// siblings. The page fails with the first failing slot in page order.
    pub async fn assemble_each(
        &self,
        slots: &[FragmentSlot],
    ) -> Result<AssembledFragments, AssemblyError> {
        let calls = slots
            .iter()
            .map(|slot| self.fragments.fetch_fragment(&slot.request));
        let results = join_all(calls).await;

        let mut html = HashMap::with_capacity(slots.len());
        for (slot, result) in slots.iter().zip(results) {
            match result {
                Ok(fragment) => {
                    html.insert(slot.name.clone(), fragment.html);
                }
                Err(source) => {
                    return Err(AssemblyError::Fragment {
                        slot: slot.name.clone(),
                        tag: slot.request.tag().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(AssembledFragments {
            html,
            degraded: Vec::new(),
        })
    }

    /// Fetch all slots in one batch and apply the missing-fragment policy per slot.
    pub async fn assemble_batch(
        &self,
        slots: &[FragmentSlot],
    ) -> Result<AssembledFragments, AssemblyError> {
        let requests: Vec<FragmentRequest> =
            slots.iter().map(|slot| slot.request.clone()).collect();
        let resolved = self
            .fragments
            .fetch_fragment_batch(&requests)
            .await
            .map_err(AssemblyError::Batch)?;

        let mut assembled = AssembledFragments::default();
        for (index, slot) in slots.iter().enumerate() {
            let reason = match resolved.slot(index) {
                Some(FragmentOutcome::Rendered(fragment)) => {
                    assembled
                        .html
                        .insert(slot.name.clone(), fragment.html.clone());
                    continue;
                }
                Some(FragmentOutcome::Failed(failure)) => failure.reason.clone(),
                None => MISSING_FROM_BATCH.to_string(),
            };

            let tag = slot.request.tag();
            match self.policy {
                MissingFragmentPolicy::Fail => {
                    return Err(AssemblyError::Missing {
                        slot: slot.name.clone(),
                        tag: tag.to_string(),
                        reason,
                    });
                }
                MissingFragmentPolicy::Omit => {}
                MissingFragmentPolicy::Placeholder => {
                    assembled
                        .html
                        .insert(slot.name.clone(), client_placeholder(tag));
                }
            }

            warn!(
                target = TARGET,
                slot = %slot.name,
                tag = %tag,
                policy = %self.policy,
                reason = %reason,
                "Fragment unavailable; page degraded"
            );
            assembled.degraded.push(slot.name.clone());
        }

        Ok(assembled)
    }
}

/// An empty custom element the browser upgrades on the client.
fn client_placeholder(tag: &str) -> String {
    format!("<{tag}></{tag}>")
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::domain::fragments::{BatchItem, RenderedFragment, ResolvedFragments};

    #[derive(Default)]
    struct ScriptedSource {
        single: HashMap<String, Result<String, u16>>,
        batch: Option<Vec<BatchItem>>,
        batch_calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn with_single(mut self, tag: &str, result: Result<&str, u16>) -> Self {
            self.single
                .insert(tag.to_string(), result.map(str::to_string));
            self
        }

        fn with_batch(mut self, items: Vec<BatchItem>) -> Self {
            self.batch = Some(items);
            self
        }
    }

    #[async_trait]
    impl FragmentSource for ScriptedSource {
        async fn fetch_fragment(
            &self,
            request: &FragmentRequest,
        ) -> Result<RenderedFragment, FragmentError> {
            match self.single.get(request.tag()) {
                Some(Ok(html)) => Ok(RenderedFragment {
                    tag: request.tag().to_string(),
                    html: html.clone(),
                    cached: false,
                    elapsed_ms: None,
                }),
                Some(Err(status)) => Err(FragmentError::UpstreamStatus { status: *status }),
                None => Err(FragmentError::transport("connection refused")),
            }
        }

        async fn fetch_fragment_batch(
            &self,
            requests: &[FragmentRequest],
        ) -> Result<ResolvedFragments, FragmentError> {
            *self.batch_calls.lock().expect("lock") += 1;
            match &self.batch {
                Some(items) => Ok(ResolvedFragments::correlate(requests, items.clone())),
                None => Err(FragmentError::timeout("deadline exceeded")),
            }
        }

        async fn health(&self) -> Result<(), FragmentError> {
            Ok(())
        }
    }

    fn slot(name: &str, tag: &str) -> FragmentSlot {
        FragmentSlot::new(name, FragmentRequest::bare(tag).expect("valid tag"))
    }

    fn item(html: &str, error: &str) -> BatchItem {
        BatchItem {
            html: html.to_string(),
            error: error.to_string(),
            ..Default::default()
        }
    }

    fn assembler(source: ScriptedSource, policy: MissingFragmentPolicy) -> PageAssembler {
        PageAssembler::new(Arc::new(source), policy)
    }

    #[tokio::test]
    async fn each_mode_keys_html_by_slot() {
        let source = ScriptedSource::default()
            .with_single("hello-widget", Ok("<hello-widget ssr></hello-widget>"))
            .with_single("ssr-hello-widget", Ok("<ssr-hello-widget ssr></ssr-hello-widget>"));
        let assembled = assembler(source, MissingFragmentPolicy::Fail)
            .assemble_each(&[
                slot("widget", "hello-widget"),
                slot("widget_ssr", "ssr-hello-widget"),
            ])
            .await
            .expect("assembled");

        assert_eq!(assembled.html("widget"), "<hello-widget ssr></hello-widget>");
        assert_eq!(
            assembled.html("widget_ssr"),
            "<ssr-hello-widget ssr></ssr-hello-widget>"
        );
        assert!(assembled.degraded().is_empty());
    }

    #[tokio::test]
    async fn each_mode_fails_page_on_any_fragment_error() {
        let source = ScriptedSource::default()
            .with_single("ok-widget", Ok("<ok-widget></ok-widget>"))
            .with_single("bad-widget", Err(500));
        let err = assembler(source, MissingFragmentPolicy::Placeholder)
            .assemble_each(&[slot("first", "ok-widget"), slot("second", "bad-widget")])
            .await
            .expect_err("page should fail");

        match err {
            AssemblyError::Fragment { slot, tag, source } => {
                assert_eq!(slot, "second");
                assert_eq!(tag, "bad-widget");
                assert!(matches!(
                    source,
                    FragmentError::UpstreamStatus { status: 500 }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Sleeps before answering `slow-widget`; fails `fast-widget` at once.
    #[derive(Default)]
    struct StaggeredSource {
        slow_completed: AtomicBool,
    }

    #[async_trait]
    impl FragmentSource for StaggeredSource {
        async fn fetch_fragment(
            &self,
            request: &FragmentRequest,
        ) -> Result<RenderedFragment, FragmentError> {
            if request.tag() == "fast-widget" {
                return Err(FragmentError::timeout("deadline exceeded"));
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
            self.slow_completed.store(true, Ordering::SeqCst);
            Err(FragmentError::UpstreamStatus { status: 500 })
        }

        async fn fetch_fragment_batch(
            &self,
            requests: &[FragmentRequest],
        ) -> Result<ResolvedFragments, FragmentError> {
            Ok(ResolvedFragments::correlate(requests, Vec::new()))
        }

        async fn health(&self) -> Result<(), FragmentError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn each_mode_lets_siblings_finish_and_reports_in_page_order() {
        let source = Arc::new(StaggeredSource::default());
        let assembler = PageAssembler::new(source.clone(), MissingFragmentPolicy::Fail);

        let err = assembler
            .assemble_each(&[slot("first", "slow-widget"), slot("second", "fast-widget")])
            .await
            .expect_err("page should fail");

        assert!(source.slow_completed.load(Ordering::SeqCst));
        match err {
            AssemblyError::Fragment { slot, tag, source } => {
                assert_eq!(slot, "first");
                assert_eq!(tag, "slow-widget");
                assert!(matches!(
                    source,
                    FragmentError::UpstreamStatus { status: 500 }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_omit_policy_leaves_slot_empty() {
        let source = ScriptedSource::default().with_batch(vec![item("<a/>", ""), item("", "boom")]);
        let assembled = assembler(source, MissingFragmentPolicy::Omit)
            .assemble_batch(&[slot("first", "a"), slot("second", "b")])
            .await
            .expect("batch succeeds");

        assert_eq!(assembled.html("first"), "<a/>");
        assert!(!assembled.contains("second"));
        assert_eq!(assembled.html("second"), "");
        assert_eq!(assembled.degraded(), &["second".to_string()]);
    }

    #[tokio::test]
    async fn batch_placeholder_policy_emits_client_element() {
        let source = ScriptedSource::default().with_batch(vec![item("<a/>", ""), item("", "boom")]);
        let assembled = assembler(source, MissingFragmentPolicy::Placeholder)
            .assemble_batch(&[slot("first", "a-card"), slot("second", "b-card")])
            .await
            .expect("batch succeeds");

        assert_eq!(assembled.html("second"), "<b-card></b-card>");
        assert_eq!(assembled.degraded(), &["second".to_string()]);
    }

    #[tokio::test]
    async fn batch_fail_policy_fails_page() {
        let source = ScriptedSource::default().with_batch(vec![item("<a/>", ""), item("", "boom")]);
        let err = assembler(source, MissingFragmentPolicy::Fail)
            .assemble_batch(&[slot("first", "a"), slot("second", "b")])
            .await
            .expect_err("page should fail");

        assert!(matches!(
            err,
            AssemblyError::Missing { ref slot, ref reason, .. } if slot == "second" && reason == "boom"
        ));
        assert!(err.fragment_error().is_none());
    }

    #[tokio::test]
    async fn batch_keeps_duplicate_tags_apart() {
        let source = ScriptedSource::default().with_batch(vec![
            item("<w>Alice</w>", ""),
            item("<w>Bob</w>", ""),
        ]);
        let assembled = assembler(source, MissingFragmentPolicy::Fail)
            .assemble_batch(&[slot("alice", "w-card"), slot("bob", "w-card")])
            .await
            .expect("batch succeeds");

        assert_eq!(assembled.html("alice"), "<w>Alice</w>");
        assert_eq!(assembled.html("bob"), "<w>Bob</w>");
    }

    #[tokio::test]
    async fn batch_transport_failure_is_top_level() {
        let source = ScriptedSource::default();
        let err = assembler(source, MissingFragmentPolicy::Omit)
            .assemble_batch(&[slot("first", "a")])
            .await
            .expect_err("transport failure");

        assert!(matches!(err, AssemblyError::Batch(ref source) if source.is_timeout()));
    }

    #[tokio::test]
    async fn empty_batch_still_asks_the_source() {
        let source = Arc::new(ScriptedSource::default().with_batch(Vec::new()));
        let assembler = PageAssembler::new(source.clone(), MissingFragmentPolicy::Fail);
        let assembled = assembler.assemble_batch(&[]).await.expect("empty batch");

        assert!(assembled.degraded().is_empty());
        assert_eq!(*source.batch_calls.lock().expect("lock"), 1);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(
            "PLACEHOLDER".parse::<MissingFragmentPolicy>(),
            Ok(MissingFragmentPolicy::Placeholder)
        );
        assert_eq!(
            "omit".parse::<MissingFragmentPolicy>(),
            Ok(MissingFragmentPolicy::Omit)
        );
        assert!("skip".parse::<MissingFragmentPolicy>().is_err());
    }
}
