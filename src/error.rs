use axum::http::StatusCode;
use thiserror::Error;

use crate::llm::RunStatus;

/// Pipeline stage at which an upstream call failed. Reported back to the
/// caller as the error `source` so failures can be diagnosed without
/// exposing the upstream credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    CreateThread,
    PostMessage,
    StartRun,
    PollRun,
    FetchMessages,
    ListAssistants,
    Completion,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CreateThread => "create_thread",
            Stage::PostMessage => "post_message",
            Stage::StartRun => "start_run",
            Stage::PollRun => "poll_run",
            Stage::FetchMessages => "fetch_messages",
            Stage::ListAssistants => "list_assistants",
            Stage::Completion => "completion",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The caller sent malformed input. Not retryable.
    #[error("{0}")]
    InvalidRequest(String),

    /// A required secret is missing from server configuration. Raised before
    /// any network call is attempted.
    #[error("{0} is not configured")]
    Configuration(&'static str),

    /// The upstream service answered a specific stage with a non-success
    /// status (transport failures surface here with status 502).
    #[error("upstream error at {stage} (status {status}): {body}")]
    Upstream {
        stage: Stage,
        status: u16,
        body: String,
    },

    /// The run did not reach a terminal state within the polling budget.
    #[error("assistant response timed out")]
    Timeout,

    /// The run reached a terminal state other than `completed`.
    #[error("assistant run failed with status: {status}")]
    RunFailed { status: RunStatus },

    /// The run completed but no assistant-authored text could be extracted.
    /// The HTTP layer softens this into a fallback reply.
    #[error("no assistant reply found in thread")]
    NoReply,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::RunFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::NoReply => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            RelayError::Upstream { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            RelayError::InvalidRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Configuration("OPENAI_API_KEY").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(RelayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn upstream_status_passes_through() {
        let err = RelayError::Upstream {
            stage: Stage::StartRun,
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.stage(), Some(Stage::StartRun));
    }

    #[test]
    fn unmappable_upstream_status_becomes_bad_gateway() {
        let err = RelayError::Upstream {
            stage: Stage::CreateThread,
            status: 0,
            body: "connection refused".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
