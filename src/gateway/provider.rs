//! OpenAI-compatible completion transport.
//!
//! The wire types here are the only place provider quirks are allowed to
//! exist. [`parse_completion`] normalizes every response into a
//! [`RawCompletion`] at the boundary; nothing past this module sees
//! provider-specific fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::budget::TokenUsage;
use crate::error::{ProviderError, Result};
use crate::tools::ToolSpec;
use crate::transcript::{Message, Role, ToolCall};

/// Request timeout. Generous because long completions stream slowly.
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Sampling and sizing parameters for one request.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// A normalized provider response.
#[derive(Debug, Clone, Default)]
pub struct RawCompletion {
    pub text: String,
    /// Reasoning from a dedicated response field, when the provider has one.
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// One round trip to a completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &RequestParams,
    ) -> Result<RawCompletion>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// Arguments arrive as a JSON-encoded string, per the wire format.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolDef,
}

#[derive(Debug, Serialize)]
struct WireToolDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Some providers surface chain-of-thought here instead of in-band.
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}

// ============================================================================
// Conversion
// ============================================================================

fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let tool_calls = msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect()
            });
            WireMessage {
                role,
                content: msg.content.clone(),
                tool_calls,
                tool_call_id: msg.tool_call_id.clone(),
            }
        })
        .collect()
}

fn convert_tools(tools: &[ToolSpec]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|spec| WireTool {
                kind: "function",
                function: WireToolDef {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Normalize a wire response into a [`RawCompletion`].
///
/// Malformed argument JSON is preserved as `{"raw": "<text>"}` so the model
/// can see and repair its own call on the next turn.
fn parse_completion(response: ChatResponse) -> Result<RawCompletion> {
    let usage = response.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens.unwrap_or(0),
        output_tokens: u.completion_tokens.unwrap_or(0),
        cached_tokens: u
            .prompt_tokens_details
            .and_then(|d| d.cached_tokens)
            .unwrap_or(0),
    });

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Other("response contained no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|wire| {
            let arguments = serde_json::from_str(&wire.function.arguments)
                .unwrap_or_else(|_| json!({ "raw": wire.function.arguments }));
            ToolCall::new(wire.id, wire.function.name, arguments)
        })
        .collect();

    Ok(RawCompletion {
        text: choice.message.content.unwrap_or_default(),
        reasoning: choice.message.reasoning_content,
        tool_calls,
        finish_reason: choice.finish_reason,
        usage,
    })
}

// ============================================================================
// HTTP client
// ============================================================================

/// Transport for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &RequestParams,
    ) -> Result<RawCompletion> {
        let request = ChatRequest {
            model: params.model.clone(),
            messages: convert_messages(messages),
            tools: convert_tools(tools),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        debug!(
            model = %params.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body).into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("malformed response body: {}", e)))?;

        parse_completion(parsed)
    }
}
