//! Seam between page assembly and the remote rendering service.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::fragments::{FragmentRequest, RenderedFragment, ResolvedFragments};

/// Failure of a whole fragment call. Per-fragment batch failures are not errors; they are
/// reported inside [`ResolvedFragments`].
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("failed to encode render request: {0}")]
    Encode(String),
    #[error("rendering service unreachable: {message}")]
    Transport { message: String, timed_out: bool },
    #[error("rendering service returned status {status}")]
    UpstreamStatus { status: u16 },
    #[error("failed to decode render response: {0}")]
    Decode(String),
}

impl FragmentError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Whether a caller-side retry could succeed. Fragment rendering is a pure read, so
    /// retrying is safe, but nothing in this crate retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, FragmentError::Transport { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FragmentError::Transport {
                timed_out: true,
                ..
            }
        )
    }

    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FragmentError::Encode(_) => "encode",
            FragmentError::Transport {
                timed_out: true, ..
            } => "timeout",
            FragmentError::Transport { .. } => "transport",
            FragmentError::UpstreamStatus { .. } => "status",
            FragmentError::Decode(_) => "decode",
        }
    }
}

impl From<serde_json::Error> for FragmentError {
    fn from(err: serde_json::Error) -> Self {
        FragmentError::Encode(err.to_string())
    }
}

/// Remote capability that turns fragment requests into trusted HTML.
///
/// Implementations are shared across concurrent page requests.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    async fn fetch_fragment(
        &self,
        request: &FragmentRequest,
    ) -> Result<RenderedFragment, FragmentError>;

    /// Render every request in one exchange. The result holds one outcome per request, in
    /// request order.
    async fn fetch_fragment_batch(
        &self,
        requests: &[FragmentRequest],
    ) -> Result<ResolvedFragments, FragmentError>;

    async fn health(&self) -> Result<(), FragmentError>;
}
