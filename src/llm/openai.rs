use log::debug;
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ AssistantBackend, AssistantInfo, RunHandle, ThreadMessage };
use crate::error::{ RelayError, Stage };
use crate::models::chat::ChatMessage;
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Assistants API v2 requires this beta header on thread and run calls.
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

pub struct OpenAIAssistantClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct StartRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_messages: Option<Vec<PostMessageRequest<'a>>>,
}

#[derive(Deserialize)]
struct ThreadResponse {
    id: String,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize, Default)]
struct AssistantMetadata {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct AssistantObject {
    id: String,
    name: Option<String>,
    #[serde(default)]
    metadata: Option<AssistantMetadata>,
}

#[derive(Serialize)]
struct ResponsesMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ResponsesInput {
    Text(String),
    Messages(Vec<ResponsesMessage>),
}

#[derive(Serialize)]
struct ResponsesRequest {
    model: String,
    input: ResponsesInput,
    temperature: f32,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesResponse {
    /// Prefer the convenience `output_text` field; otherwise join the
    /// `output_text` content items across all output entries.
    fn extract_text(self) -> String {
        if let Some(text) = self.output_text {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|content| content.kind == "output_text")
            .filter_map(|content| content.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn map_assistant(assistant: AssistantObject) -> AssistantInfo {
    let metadata = assistant.metadata.unwrap_or_default();
    AssistantInfo {
        id: assistant.id,
        name: assistant
            .name
            .or(metadata.title)
            .unwrap_or_else(|| "Assistant".to_string()),
        description: metadata.description.unwrap_or_default(),
    }
}

impl OpenAIAssistantClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Pass the upstream body through on non-success so the orchestrator can
    /// inspect rejection reasons (e.g. unsupported-parameter fallback).
    async fn check(resp: Response, stage: Stage) -> Result<Response, RelayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RelayError::Upstream {
            stage,
            status: status.as_u16(),
            body,
        })
    }

    fn transport(stage: Stage) -> impl FnOnce(reqwest::Error) -> RelayError {
        move |err| RelayError::Upstream {
            stage,
            status: 502,
            body: err.to_string(),
        }
    }

    async fn responses_call(&self, input: ResponsesInput) -> Result<String, RelayError> {
        let stage = Stage::Completion;
        let req = ResponsesRequest {
            model: self.model.clone(),
            input,
            temperature: 0.3,
        };
        let resp = self
            .http
            .post(self.url("/v1/responses"))
            .json(&req)
            .send()
            .await
            .map_err(Self::transport(stage))?;
        let parsed = Self::check(resp, stage)
            .await?
            .json::<ResponsesResponse>()
            .await
            .map_err(Self::transport(stage))?;
        Ok(parsed.extract_text())
    }
}

#[async_trait]
impl AssistantBackend for OpenAIAssistantClient {
    async fn create_thread(&self) -> Result<String, RelayError> {
        let stage = Stage::CreateThread;
        let resp = self
            .http
            .post(self.url("/v1/threads"))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::transport(stage))?;
        let thread = Self::check(resp, stage)
            .await?
            .json::<ThreadResponse>()
            .await
            .map_err(Self::transport(stage))?;
        debug!("Created thread: {}", thread.id);
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<(), RelayError> {
        let stage = Stage::PostMessage;
        let resp = self
            .http
            .post(self.url(&format!("/v1/threads/{}/messages", thread_id)))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .json(&PostMessageRequest { role: "user", content })
            .send()
            .await
            .map_err(Self::transport(stage))?;
        Self::check(resp, stage).await?;
        Ok(())
    }

    async fn start_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        inline_message: Option<&str>,
    ) -> Result<RunHandle, RelayError> {
        let stage = Stage::StartRun;
        let req = StartRunRequest {
            assistant_id,
            additional_messages: inline_message.map(|content| {
                vec![PostMessageRequest { role: "user", content }]
            }),
        };
        let resp = self
            .http
            .post(self.url(&format!("/v1/threads/{}/runs", thread_id)))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .json(&req)
            .send()
            .await
            .map_err(Self::transport(stage))?;
        Self::check(resp, stage)
            .await?
            .json::<RunHandle>()
            .await
            .map_err(Self::transport(stage))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunHandle, RelayError> {
        let stage = Stage::PollRun;
        let resp = self
            .http
            .get(self.url(&format!("/v1/threads/{}/runs/{}", thread_id, run_id)))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await
            .map_err(Self::transport(stage))?;
        Self::check(resp, stage)
            .await?
            .json::<RunHandle>()
            .await
            .map_err(Self::transport(stage))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError> {
        let stage = Stage::FetchMessages;
        let resp = self
            .http
            .get(self.url(&format!("/v1/threads/{}/messages", thread_id)))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await
            .map_err(Self::transport(stage))?;
        let list = Self::check(resp, stage)
            .await?
            .json::<ListResponse<ThreadMessage>>()
            .await
            .map_err(Self::transport(stage))?;
        Ok(list.data)
    }

    async fn list_assistants(&self) -> Result<Vec<AssistantInfo>, RelayError> {
        let stage = Stage::ListAssistants;
        let resp = self
            .http
            .get(self.url("/v1/assistants"))
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await
            .map_err(Self::transport(stage))?;
        let list = Self::check(resp, stage)
            .await?
            .json::<ListResponse<AssistantObject>>()
            .await
            .map_err(Self::transport(stage))?;
        Ok(list.data.into_iter().map(map_assistant).collect())
    }

    async fn complete(&self, prompt: &str) -> Result<String, RelayError> {
        self.responses_call(ResponsesInput::Text(prompt.to_string())).await
    }

    async fn respond(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let input = messages
            .iter()
            .map(|message| ResponsesMessage {
                role: message.role.to_string(),
                content: message.content.as_text(),
            })
            .collect();
        self.responses_call(ResponsesInput::Messages(input)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_prefers_output_text_field() {
        let resp: ResponsesResponse = serde_json::from_str(
            r#"{"output_text": "direct", "output": [{"content": [{"type": "output_text", "text": "ignored"}]}]}"#,
        )
        .unwrap();
        assert_eq!(resp.extract_text(), "direct");
    }

    #[test]
    fn extract_text_joins_output_items() {
        let resp: ResponsesResponse = serde_json::from_str(
            r#"{"output": [
                {"content": [{"type": "output_text", "text": "one"}, {"type": "reasoning"}]},
                {"content": [{"type": "output_text", "text": "two"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(resp.extract_text(), "one\ntwo");
    }

    #[test]
    fn assistant_name_falls_back_to_metadata_title() {
        let assistant: AssistantObject = serde_json::from_str(
            r#"{"id": "asst_1", "name": null, "metadata": {"title": "Market Analyst", "description": "Sector briefings"}}"#,
        )
        .unwrap();
        let info = map_assistant(assistant);
        assert_eq!(info.name, "Market Analyst");
        assert_eq!(info.description, "Sector briefings");
    }

    #[test]
    fn assistant_without_name_or_metadata_gets_default_label() {
        let assistant: AssistantObject =
            serde_json::from_str(r#"{"id": "asst_2"}"#).unwrap();
        let info = map_assistant(assistant);
        assert_eq!(info.name, "Assistant");
        assert_eq!(info.description, "");
    }
}
