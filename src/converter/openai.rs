//!
//! OpenAI-compatible wire types.
//!
//! Inbound request bodies for chat completions and embeddings, and the
//! response, chunk and listing shapes returned to callers.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/* --- request types --------------------------------------------------------------------------- */

///
/// OpenAI chat completion request structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    /** requested model, resolved against the upstream model families */
    pub model: Option<String>,
    /** conversation messages */
    pub messages: Vec<ChatMessage>,
    /** whether to stream the response */
    pub stream: Option<bool>,
    /** streaming options (usage reporting) */
    pub stream_options: Option<StreamOptions>,
    /** available tools for function calling */
    pub tools: Option<Vec<ToolDefinition>>,
    /** "none" | "auto" | "required" | {"type":"function","function":{"name":..}} */
    pub tool_choice: Option<Value>,
    /** output format constraint */
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
    pub n: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub seed: Option<i64>,
    pub stop: Option<StopSequences>,
    /** none | low | medium | high */
    pub reasoning_effort: Option<String>,
    /** vendor passthrough; only the `google` member is read */
    pub extra_body: Option<Value>,
}

///
/// A single conversation message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    /** system, user, assistant or tool */
    pub role: String,
    /** text or multimodal parts */
    pub content: Option<MessageContent>,
    /** calls made by an assistant turn */
    pub tool_calls: Option<Vec<ToolCall>>,
    /** call being answered by a tool turn */
    pub tool_call_id: Option<String>,
    /** optional participant or function name */
    pub name: Option<String>,
}

///
/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

///
/// One typed content part. The type is kept as a string so unknown kinds can
/// be rejected with a clear message.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    pub image_url: Option<ImageUrl>,
    pub input_audio: Option<InputAudio>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputAudio {
    /** base64 audio bytes */
    pub data: String,
    /** wav, mp3, ... */
    pub format: String,
}

///
/// Tool call made by the assistant.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /** JSON-encoded string per the OpenAI contract; objects are tolerated */
    pub arguments: Value,
}

///
/// Tool definition offered to the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: Option<FunctionDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
}

///
/// `response_format` request field.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: Option<JsonSchemaFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: Option<String>,
    pub schema: Option<Value>,
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamOptions {
    pub include_usage: Option<bool>,
}

///
/// OpenAI embeddings request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: Option<String>,
    pub input: EmbeddingInput,
    /** requested output dimensionality */
    pub dimensions: Option<u32>,
    /** only "float" is supported */
    pub encoding_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    One(String),
    Many(Vec<String>),
}

/* --- response types -------------------------------------------------------------------------- */

///
/// Non-streaming chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub index: u32,
    /** null when the prompt was blocked */
    pub message: Option<AssistantMessage>,
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallOut>>,
}

///
/// Tool call in a response message or delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallOut {
    /** position within the delta; only set on streamed chunks */
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionCallOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallOut {
    pub name: String,
    /** JSON-encoded arguments */
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptTokensDetails {
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: u64,
}

///
/// Streaming chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub logprobs: Option<Value>,
    /** null on every intermediate chunk */
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallOut>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsResponse {
    pub object: &'static str,
    pub data: Vec<EmbeddingData>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingData {
    pub object: &'static str,
    pub index: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

/* --- start of code -------------------------------------------------------------------------- */

fn default_tool_type() -> String {
    "function".to_string()
}

impl ChatCompletionRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Whether the caller asked for usage on the final streamed chunk.
    pub fn include_stream_usage(&self) -> bool {
        self.stream_options.as_ref().and_then(|o| o.include_usage).unwrap_or(false)
    }
}

impl Delta {
    /// True when the delta carries neither text nor tool-call fragments.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tool_calls.is_none()
    }
}

impl EmbeddingInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingInput::One(text) => vec![text],
            EmbeddingInput::Many(texts) => texts,
        }
    }
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(stop) => vec![stop],
            StopSequences::Many(stops) => stops,
        }
    }
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parses_mixed_content() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gemini-2.5-pro",
            "stream": true,
            "stream_options": {"include_usage": true},
            "stop": "END",
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "lookup", "arguments": "{\"q\":1}"}}
                ]}
            ]
        }))
        .unwrap();

        assert!(request.is_streaming());
        assert!(request.include_stream_usage());
        assert!(matches!(request.stop, Some(StopSequences::One(_))));
        assert!(matches!(request.messages[0].content, Some(MessageContent::Parts(ref p)) if p.len() == 2));
        assert_eq!(request.messages[1].tool_calls.as_ref().unwrap()[0].kind, "function");
    }

    #[test]
    fn test_delta_serialization_omits_absent_fields() {
        let delta = Delta { content: Some("hi".into()), ..Delta::default() };
        assert_eq!(serde_json::to_value(&delta).unwrap(), json!({"content": "hi"}));
        assert!(Delta::default().is_empty());
    }

    #[test]
    fn test_blocked_choice_serializes_null_message() {
        let choice = Choice {
            index: 0,
            message: None,
            logprobs: None,
            finish_reason: Some("content_filter".into()),
        };
        let value = serde_json::to_value(&choice).unwrap();
        assert_eq!(value["message"], Value::Null);
        assert_eq!(value["finish_reason"], "content_filter");
    }
}
