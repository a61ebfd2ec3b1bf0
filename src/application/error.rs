use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{assembler::AssemblyError, fragments::FragmentError},
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Status a failed rendering service call maps to at the page edge.
pub fn fragment_error_status(error: &FragmentError) -> StatusCode {
    match error {
        FragmentError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FragmentError::Transport {
            timed_out: true, ..
        } => StatusCode::GATEWAY_TIMEOUT,
        FragmentError::Transport { .. }
        | FragmentError::UpstreamStatus { .. }
        | FragmentError::Decode(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<AssemblyError> for HttpError {
    fn from(error: AssemblyError) -> Self {
        const SOURCE: &str = "application::error::assembly_error_to_http_error";

        let (status, public_message) = match error.fragment_error() {
            Some(inner) => match fragment_error_status(inner) {
                StatusCode::GATEWAY_TIMEOUT => {
                    (StatusCode::GATEWAY_TIMEOUT, "Rendering service timed out")
                }
                StatusCode::BAD_GATEWAY => (StatusCode::BAD_GATEWAY, "Rendering service failed"),
                status => (status, "Internal server error"),
            },
            None => (StatusCode::BAD_GATEWAY, "Page component unavailable"),
        };

        HttpError::from_error(SOURCE, status, public_message, &error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment_failure(source: FragmentError) -> AssemblyError {
        AssemblyError::Fragment {
            slot: "widget".to_string(),
            tag: "hello-widget".to_string(),
            source,
        }
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        let err = HttpError::from(fragment_failure(FragmentError::timeout("deadline")));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        for source in [
            FragmentError::transport("refused"),
            FragmentError::UpstreamStatus { status: 500 },
            FragmentError::Decode("expected `html`".into()),
        ] {
            let err = HttpError::from(AssemblyError::Batch(source));
            assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn encode_failures_are_internal_errors() {
        let err = HttpError::from(fragment_failure(FragmentError::Encode("nan".into())));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_fragment_maps_to_bad_gateway_with_chain() {
        let err = HttpError::from(AssemblyError::Missing {
            slot: "bob".to_string(),
            tag: "ssr-hello-widget".to_string(),
            reason: "boom".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let response = err.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("boom"));
    }

    #[test]
    fn report_walks_the_source_chain() {
        let err = fragment_failure(FragmentError::UpstreamStatus { status: 503 });
        let report = ErrorReport::from_error("test", StatusCode::BAD_GATEWAY, &err);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "rendering service returned status 503");
    }
}
