use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use querent_core::config::ProviderConfig;
use querent_core::domain::message::{Message, Role, ToolCall};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::credentials::{ClientFactory, Credential};
use crate::llm::{ModelClient, ModelReply, ModelRequest, ProviderError, ToolSpec};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone, Debug, PartialEq)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub thinking_budget: i32,
    pub timeout: Duration,
}

impl GeminiSettings {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            thinking_budget: config.thinking_budget,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Function-calling client for the Gemini `generateContent` endpoint, bound
/// to one API key.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    settings: GeminiSettings,
    api_key: SecretString,
    http: Client,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings, api_key: SecretString) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| ProviderError::Rejected(error.to_string()))?;
        Ok(Self { settings, api_key, http })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, ProviderError> {
        let body = build_request(&self.settings, request);
        debug!(
            event_name = "provider.request",
            model = %self.settings.model,
            messages = request.messages.len(),
            "sending generateContent request"
        );

        let response = self
            .http
            .post(self.settings.endpoint())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = ProviderError::from_status(status.as_u16(), error_detail(&text));
            warn!(
                event_name = "provider.request.failed",
                model = %self.settings.model,
                status = status.as_u16(),
                retryable = error.is_retryable(),
                "generateContent returned an error"
            );
            return Err(error);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::Rejected(format!("malformed response: {error}")))?;
        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                event_name = "provider.usage",
                prompt_tokens = usage.prompt_token_count.unwrap_or_default(),
                candidate_tokens = usage.candidates_token_count.unwrap_or_default(),
                total_tokens = usage.total_token_count.unwrap_or_default(),
                "generateContent usage"
            );
        }
        into_reply(parsed)
    }
}

/// Builds one [`GeminiClient`] per credential.
#[derive(Clone, Debug)]
pub struct GeminiClientFactory {
    settings: GeminiSettings,
}

impl GeminiClientFactory {
    pub fn new(settings: GeminiSettings) -> Self {
        Self { settings }
    }
}

impl ClientFactory for GeminiClientFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn ModelClient>, ProviderError> {
        let client = GeminiClient::new(self.settings.clone(), credential.secret().clone())?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing)]
    thought: bool,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

fn build_request(settings: &GeminiSettings, request: ModelRequest<'_>) -> GenerateRequest {
    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolDeclarations { function_declarations: request.tools.to_vec() }]
    };

    GenerateRequest {
        system_instruction: Content {
            role: String::new(),
            parts: vec![Part::text(request.system_instruction)],
        },
        contents: contents(request.messages),
        tools,
        generation_config: GenerationConfig {
            temperature: settings.temperature,
            thinking_config: ThinkingConfig { thinking_budget: settings.thinking_budget },
        },
    }
}

/// Maps the thread onto Gemini turns. Consecutive tool results share one
/// `user` turn so they line up with the model turn that requested them.
fn contents(messages: &[Message]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();
    for message in messages {
        match message.role {
            Role::User => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part::text(message.content.clone())],
            }),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !message.content.is_empty() {
                    parts.push(Part::text(message.content.clone()));
                }
                parts.extend(message.tool_calls.iter().map(|call| Part {
                    function_call: Some(FunctionCall {
                        id: None,
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    ..Part::default()
                }));
                if !parts.is_empty() {
                    contents.push(Content { role: "model".to_string(), parts });
                }
            }
            Role::Tool => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        name: message.name.clone().unwrap_or_default(),
                        response: tool_response_payload(&message.content),
                    }),
                    ..Part::default()
                };
                match contents.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part)
                    }
                    _ => contents.push(Content { role: "user".to_string(), parts: vec![part] }),
                }
            }
        }
    }
    contents
}

fn tool_response_payload(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(object)) => Value::Object(object),
        Ok(other) => json!({ "content": other }),
        Err(_) => json!({ "content": content }),
    }
}

fn into_reply(response: GenerateResponse) -> Result<ModelReply, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Rejected("response carried no candidates".to_string()));
    };
    let finish_reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
    let parts = candidate.content.map(|content| content.parts).unwrap_or_default();

    let mut calls = Vec::new();
    let mut text = String::new();
    for (index, part) in parts.into_iter().enumerate() {
        if part.thought {
            continue;
        }
        if let Some(call) = part.function_call {
            calls.push(ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.name,
                arguments: call.args,
            });
        } else if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
    }

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }
    if text.trim().is_empty() {
        return Err(ProviderError::Rejected(format!(
            "model returned neither text nor tool calls (finish reason {finish_reason})"
        )));
    }
    Ok(ModelReply::Answer(text))
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value.pointer("/error/message").and_then(Value::as_str).map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use querent_core::domain::message::{Message, ToolCall};
    use serde_json::json;

    use super::{build_request, error_detail, into_reply, GeminiSettings, GenerateResponse};
    use crate::llm::{ModelReply, ModelRequest, ProviderError, ToolSpec};

    fn settings() -> GeminiSettings {
        GeminiSettings {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.2,
            thinking_budget: -1,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_targets_model_generate_content() {
        assert_eq!(
            settings().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn request_body_carries_tools_thinking_budget_and_grouped_tool_results() {
        let messages = vec![
            Message::user("how many customers?"),
            Message::assistant_tool_calls(vec![
                ToolCall {
                    id: "call_0".to_string(),
                    name: "mongodb_list_collections".to_string(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "call_1".to_string(),
                    name: "get_current_date_time".to_string(),
                    arguments: json!({}),
                },
            ]),
            Message::tool("call_0", "mongodb_list_collections", r#"{"collections":["entities_data"]}"#),
            Message::tool("call_1", "get_current_date_time", "plain text"),
        ];
        let tools = vec![ToolSpec {
            name: "mongodb_list_collections".to_string(),
            description: "List collections".to_string(),
            parameters: None,
        }];

        let body = build_request(
            &settings(),
            ModelRequest { system_instruction: "be precise", tools: &tools, messages: &messages },
        );
        let value = serde_json::to_value(&body).expect("serialize");

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be precise");
        assert_eq!(value["generationConfig"]["thinkingConfig"]["thinkingBudget"], -1);
        assert_eq!(
            value["tools"][0]["functionDeclarations"][0]["name"],
            "mongodb_list_collections"
        );
        assert!(value["tools"][0]["functionDeclarations"][0].get("parameters").is_none());

        let contents = value["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][1]["functionCall"]["name"], "get_current_date_time");
        assert_eq!(contents[2]["parts"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["collections"][0],
            "entities_data"
        );
        assert_eq!(contents[2]["parts"][1]["functionResponse"]["response"]["content"], "plain text");
    }

    #[test]
    fn function_calls_take_precedence_over_text() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking out loud", "thought": true},
                    {"text": "Let me check."},
                    {"functionCall": {"name": "mongodb_schema", "args": {"entity": "Customer"}}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .expect("response");

        let reply = into_reply(response).expect("reply");

        let ModelReply::ToolCalls(calls) = reply else { panic!("expected tool calls") };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_2");
        assert_eq!(calls[0].arguments["entity"], "Customer");
    }

    #[test]
    fn text_parts_are_concatenated_without_thoughts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"text": "internal", "thought": true},
                {"text": "There are "},
                {"text": "42 customers."}
            ]}}],
            "usageMetadata": {"promptTokenCount": 10, "totalTokenCount": 12}
        }))
        .expect("response");

        assert_eq!(
            into_reply(response).expect("reply"),
            ModelReply::Answer("There are 42 customers.".to_string())
        );
    }

    #[test]
    fn empty_candidates_are_rejected() {
        let response: GenerateResponse =
            serde_json::from_value(json!({"candidates": []})).expect("response");

        assert!(matches!(into_reply(response), Err(ProviderError::Rejected(_))));
    }

    #[test]
    fn error_detail_prefers_structured_message() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;

        assert_eq!(error_detail(body), "Quota exceeded");
        assert_eq!(error_detail("gateway timeout"), "gateway timeout");
    }
}
