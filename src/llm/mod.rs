pub mod openai;

use async_trait::async_trait;
use serde::{ Serialize, Deserialize };

use crate::error::RelayError;
use crate::models::chat::{ ChatMessage, Role };

/// Status state machine of a remote run. Transitions are driven entirely by
/// the upstream service; we only observe them via polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can still make progress. `requires_action` is terminal
    /// for this proxy: it has no tool execution to offer the run.
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Identifier plus last observed status of a remote run.
#[derive(Clone, Debug, Deserialize)]
pub struct RunHandle {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextValue {
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ThreadContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextValue>,
}

/// One message as stored on a remote thread.
#[derive(Clone, Debug, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<ThreadContentBlock>,
}

impl ThreadMessage {
    /// Value of the first text-typed content block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text.as_ref())
            .map(|text| text.value.as_str())
    }
}

/// Assistant listing entry exposed to the frontend for discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Seam over the upstream assistants service. The production implementation
/// is [`openai::OpenAIAssistantClient`]; tests substitute scripted mocks.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Create a fresh remote conversation context and return its id.
    async fn create_thread(&self) -> Result<String, RelayError>;

    /// Append a user message to an existing thread.
    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), RelayError>;

    /// Start a run of `assistant_id` against the thread. When
    /// `inline_message` is set the user turn rides along with the run request
    /// instead of being posted to the thread beforehand; both submission
    /// paths leave the remote thread in an equivalent state.
    async fn start_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        inline_message: Option<&str>,
    ) -> Result<RunHandle, RelayError>;

    /// Fetch the current status of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunHandle, RelayError>;

    /// List the messages accumulated on a thread. Callers must not assume
    /// any particular ordering.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError>;

    /// List the assistants configured on the upstream account.
    async fn list_assistants(&self) -> Result<Vec<AssistantInfo>, RelayError>;

    /// Single-shot generation from a flattened prompt, bypassing the
    /// thread/run workflow. Used as the fallback path.
    async fn complete(&self, prompt: &str) -> Result<String, RelayError>;

    /// Single-shot generation from a structured conversation.
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_deserializes_snake_case() {
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);
        assert!(status.is_pending());
    }

    #[test]
    fn unrecognized_run_status_maps_to_unknown() {
        let status: RunStatus = serde_json::from_str("\"brand_new_state\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert!(!status.is_pending());
    }

    #[test]
    fn first_text_skips_non_text_blocks() {
        let message: ThreadMessage = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "role": "assistant",
                "created_at": 10,
                "content": [
                    {"type": "image_file"},
                    {"type": "text", "text": {"value": "hello"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(message.first_text(), Some("hello"));
    }
}
