use log::{ info, warn };
use std::time::Duration;
use tokio::time::sleep;

use crate::error::RelayError;
use crate::llm::{ AssistantBackend, RunStatus, ThreadMessage };
use crate::models::chat::{ ChatMessage, Role };

/// Returned to the caller when the run completed but the assistant produced
/// no usable text.
pub const EMPTY_REPLY_FALLBACK: &str = "Sorry, I couldn't generate a reply.";

/// How the reply was produced. Surfaced in response metadata so fallback
/// replies are distinguishable from real assistant runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplySource {
    Assistant,
    Completion,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Assistant => "assistant",
            ReplySource::Completion => "completion",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssistantReply {
    pub text: String,
    pub source: ReplySource,
}

/// Tunables for the run workflow. Defaults match the production proxy:
/// 500 ms polls, 60 attempts (30 seconds), user turn posted as a thread
/// message before the run starts.
#[derive(Clone, Debug)]
pub struct RunPolicy {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub inline_run_input: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_poll_attempts: 60,
            inline_run_input: false,
        }
    }
}

/// Heuristic for upstream run-start rejections that warrant falling back to
/// the single-shot completion path. Prefers the structured `error.code`
/// field; matches on message wording only when no code is present.
pub(crate) fn is_unsupported_parameter_rejection(body: &str) -> bool {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(code) = parsed["error"]["code"].as_str() {
            return code == "unsupported_parameter" || code == "unknown_parameter";
        }
    }
    body.contains("Unsupported parameter") || body.contains("unsupported_parameter")
}

/// Most recent assistant-authored message. Selection is by role and
/// `created_at`, never by list position: the upstream may return messages
/// newest-first or oldest-first.
fn latest_assistant_message(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .max_by_key(|message| message.created_at)
}

/// Drive one assistant run to completion and return the reply text.
///
/// Creates a fresh remote thread per call (no thread reuse across requests),
/// forwards only the most recent turn to the thread, starts a run, polls the
/// run status on a fixed interval until a terminal state or the attempt
/// budget is spent, then extracts the newest assistant message. If the
/// upstream rejects the run start for an unsupported parameter, the whole
/// conversation is flattened into one prompt and sent through the single-shot
/// completion path instead.
pub async fn run_assistant(
    backend: &dyn AssistantBackend,
    assistant_id: &str,
    messages: &[ChatMessage],
    policy: &RunPolicy,
) -> Result<AssistantReply, RelayError> {
    if assistant_id.is_empty() {
        return Err(RelayError::InvalidRequest("assistant_id is required".into()));
    }
    if messages.is_empty() {
        return Err(RelayError::InvalidRequest("messages must be a non-empty array".into()));
    }

    let thread_id = backend.create_thread().await?;
    info!("Created thread {} for assistant {}", thread_id, assistant_id);

    // Only the most recent turn is forwarded; the remote thread carries no
    // history from previous requests by construction.
    let last_turn = messages
        .last()
        .map(|message| message.content.as_text())
        .unwrap_or_default();

    let started = if policy.inline_run_input {
        backend.start_run(&thread_id, assistant_id, Some(&last_turn)).await
    } else {
        backend.post_message(&thread_id, &last_turn).await?;
        backend.start_run(&thread_id, assistant_id, None).await
    };

    let mut run = match started {
        Ok(run) => run,
        Err(RelayError::Upstream { status, body, .. })
            if is_unsupported_parameter_rejection(&body) =>
        {
            warn!(
                "Run start rejected (status {}), falling back to single-shot completion",
                status
            );
            return complete_fallback(backend, messages).await;
        }
        Err(err) => return Err(err),
    };

    let mut attempts = 0;
    while run.status.is_pending() {
        if attempts >= policy.max_poll_attempts {
            warn!("Run {} timed out after {} polls", run.id, attempts);
            return Err(RelayError::Timeout);
        }
        sleep(policy.poll_interval).await;
        run = backend.get_run(&thread_id, &run.id).await?;
        attempts += 1;
    }

    if run.status != RunStatus::Completed {
        return Err(RelayError::RunFailed { status: run.status });
    }

    let thread_messages = backend.list_messages(&thread_id).await?;
    let reply = latest_assistant_message(&thread_messages).ok_or(RelayError::NoReply)?;
    let text = reply.first_text().unwrap_or_default();

    Ok(AssistantReply {
        text: if text.is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            text.to_string()
        },
        source: ReplySource::Assistant,
    })
}

/// Fallback path: flatten the whole conversation into one prompt and run it
/// through the single-shot completion endpoint, skipping polling entirely.
async fn complete_fallback(
    backend: &dyn AssistantBackend,
    messages: &[ChatMessage],
) -> Result<AssistantReply, RelayError> {
    let prompt = messages
        .iter()
        .map(|message| message.content.as_text())
        .collect::<Vec<_>>()
        .join("\n");
    let text = backend.complete(&prompt).await?;

    Ok(AssistantReply {
        text: if text.is_empty() {
            EMPTY_REPLY_FALLBACK.to_string()
        } else {
            text
        },
        source: ReplySource::Completion,
    })
}
