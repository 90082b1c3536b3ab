//!
//! OpenAI to Gemini request translation.
//!
//! Walks the OpenAI conversation in order and builds the Gemini `contents`
//! list. System messages are folded into `systemInstruction`, assistant tool
//! calls are remembered in a call-id table so the tool results that follow can
//! be placed as `functionResponse` parts in call order.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value, json};

use crate::config::{LogLevel, UpstreamConfig};
use crate::converter::gemini::{
    BatchEmbedRequest, Blob, Content, EmbedContentRequest, FunctionCall, FunctionCallingConfig,
    FunctionDeclaration, FunctionResponse, GenerateContentRequest, GenerationConfig, Part,
    SafetySetting, Tool, ToolConfig,
};
use crate::converter::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, EmbeddingsRequest, MessageContent,
    ResponseFormat, ToolCall, ToolDefinition,
};
use crate::converter::{SYNTHETIC_CALL_PREFIX, strip_model_prefix};
use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Translator from OpenAI request bodies to Gemini request bodies.
pub struct RequestTranslator {
    /** logging level for payload dumps */
    log_level: LogLevel,
    /** model used when the caller names none or an unknown family */
    default_model: String,
    /** model used for embeddings when the caller names none */
    embeddings_model: String,
}

///
/// A chat request ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct ChatCall {
    /** resolved upstream model id, without the `models/` prefix */
    pub model: String,
    /** whether the caller asked for a streamed answer */
    pub stream: bool,
    /** whether streamed usage should be attached to the terminal chunks */
    pub include_usage: bool,
    pub body: GenerateContentRequest,
}

///
/// An embeddings request ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct EmbeddingsCall {
    pub model: String,
    pub body: BatchEmbedRequest,
}

///
/// Calls made by the most recent assistant turn, waiting for their results.
struct PendingCalls {
    /** (call id, function name) in the order the assistant made them */
    calls: Vec<(String, String)>,
    /** one slot per call, filled as tool messages arrive */
    responses: Vec<Option<Part>>,
}

/* --- constants ------------------------------------------------------------------------------ */

/** model families forwarded as named */
const MODEL_FAMILIES: [&str; 3] = ["gemini-", "gemma-", "learnlm-"];

/** embedding model families forwarded as named */
const EMBEDDING_FAMILIES: [&str; 3] = ["text-embedding-", "embedding-", "gemini-embedding-"];

/** harm categories relaxed to BLOCK_NONE on every request */
const HARM_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/** JSON-schema keywords the upstream rejects */
const UNSUPPORTED_SCHEMA_KEYS: [&str; 3] = ["$schema", "additionalProperties", "strict"];

/* --- start of code -------------------------------------------------------------------------- */

impl RequestTranslator {
    ///
    /// Create a new translator.
    ///
    /// # Arguments
    ///  * `log_level` - logging level for payload dumps
    ///  * `upstream` - upstream settings providing the default models
    ///
    /// # Returns
    ///  * New translator instance
    pub fn new(log_level: LogLevel, upstream: &UpstreamConfig) -> Self {
        Self {
            log_level,
            default_model: upstream.default_model.clone(),
            embeddings_model: upstream.embeddings_model.clone(),
        }
    }

    ///
    /// Resolve the upstream chat model for a requested name.
    ///
    /// `models/x` is reduced to `x`. Known Gemini families pass through,
    /// anything else falls back to the default model.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        resolve_in_families(requested, &MODEL_FAMILIES, &self.default_model)
    }

    ///
    /// Translate an OpenAI chat completion request.
    ///
    /// # Arguments
    ///  * `request` - parsed OpenAI request
    ///
    /// # Returns
    ///  * Upstream call description with the Gemini body
    ///  * `ProxyError::InvalidRequest` for malformed conversations
    ///  * `ProxyError::UnsupportedFeature` for options with no Gemini counterpart
    pub fn translate_chat(&self, request: ChatCompletionRequest) -> Result<ChatCall> {
        self.debug(&format!(
            "Translating {} message(s) to Gemini format",
            request.messages.len()
        ));

        let model = self.resolve_model(request.model.as_deref());
        let stream = request.is_streaming();
        let include_usage = request.include_stream_usage();

        let (system_instruction, contents) = self.translate_messages(&request.messages)?;

        let mut body = GenerateContentRequest {
            contents,
            system_instruction,
            tools: translate_tools(request.tools.as_deref()),
            tool_config: request.tool_choice.as_ref().map(translate_tool_choice).transpose()?,
            generation_config: translate_generation(&request)?,
            safety_settings: default_safety_settings(),
            cached_content: None,
        };

        if let Some(extra) = &request.extra_body {
            self.apply_vendor_options(extra, &mut body)?;
        }

        if self.log_level.is_trace_enabled() {
            self.debug(&format!("Gemini request for {}: {}", model, serde_json::to_string(&body)?));
        }

        Ok(ChatCall { model, stream, include_usage, body })
    }

    ///
    /// Translate an OpenAI embeddings request into a batch embed call.
    ///
    /// # Arguments
    ///  * `request` - parsed OpenAI embeddings request
    ///
    /// # Returns
    ///  * Upstream call description
    ///  * `ProxyError::InvalidRequest` when the input is empty
    ///  * `ProxyError::UnsupportedFeature` for base64 output
    pub fn translate_embeddings(&self, request: EmbeddingsRequest) -> Result<EmbeddingsCall> {
        match request.encoding_format.as_deref() {
            None | Some("float") => {}
            Some("base64") => {
                return Err(ProxyError::UnsupportedFeature(
                    "encoding_format 'base64' is not supported".to_string(),
                ));
            }
            Some(other) => {
                return Err(ProxyError::InvalidRequest(format!(
                    "unknown encoding_format '{}'",
                    other
                )));
            }
        }

        let model =
            resolve_in_families(request.model.as_deref(), &EMBEDDING_FAMILIES, &self.embeddings_model);
        let inputs = request.input.into_vec();
        if inputs.is_empty() {
            return Err(ProxyError::InvalidRequest("input must not be empty".to_string()));
        }

        self.debug(&format!("Embedding {} input(s) with {}", inputs.len(), model));

        let requests = inputs
            .into_iter()
            .map(|text| EmbedContentRequest {
                model: format!("models/{}", model),
                content: Content { role: None, parts: vec![Part::text(text)] },
                output_dimensionality: request.dimensions,
            })
            .collect();

        Ok(EmbeddingsCall { model, body: BatchEmbedRequest { requests } })
    }

    /* --- private methods ----------------------------------------------------------------- */

    ///
    /// Walk the conversation and build the system instruction and turns.
    ///
    /// # Arguments
    ///  * `messages` - OpenAI messages in conversation order
    ///
    /// # Returns
    ///  * (system instruction, Gemini contents)
    ///  * `ProxyError::InvalidRequest` on bad roles or broken tool-call correlation
    fn translate_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<(Option<Content>, Vec<Content>)> {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        let mut pending: Option<PendingCalls> = None;

        for message in messages {
            if message.role != "tool" {
                if let Some(calls) = pending.take() {
                    self.flush_responses(calls, &mut contents);
                }
            }

            match message.role.as_str() {
                "system" | "developer" => {
                    system_parts.extend(convert_content(message.content.as_ref())?);
                }
                "user" => {
                    let mut parts = convert_content(message.content.as_ref())?;
                    if !parts.iter().any(|p| p.text.is_some()) {
                        parts.push(Part::text(""));
                    }
                    contents.push(Content { role: Some("user".to_string()), parts });
                }
                "assistant" => {
                    let (content, calls) = self.convert_assistant(message)?;
                    contents.push(content);
                    pending = calls;
                }
                "tool" => {
                    let Some(calls) = pending.as_mut() else {
                        return Err(ProxyError::InvalidRequest(
                            "tool message without preceding tool calls".to_string(),
                        ));
                    };
                    attach_tool_result(message, calls)?;
                }
                other => {
                    return Err(ProxyError::InvalidRequest(format!(
                        "unknown message role '{}'",
                        other
                    )));
                }
            }
        }

        if let Some(calls) = pending.take() {
            self.flush_responses(calls, &mut contents);
        }

        let system_instruction =
            (!system_parts.is_empty()).then(|| Content { role: None, parts: system_parts });

        if contents.is_empty() {
            if system_instruction.is_none() {
                return Err(ProxyError::InvalidRequest(
                    "at least one message is required".to_string(),
                ));
            }
            contents.push(Content { role: Some("model".to_string()), parts: vec![Part::text(" ")] });
        }

        Ok((system_instruction, contents))
    }

    ///
    /// Convert an assistant message into a `model` turn.
    ///
    /// # Returns
    ///  * the turn and, when it made tool calls, the table awaiting results
    fn convert_assistant(&self, message: &ChatMessage) -> Result<(Content, Option<PendingCalls>)> {
        let mut parts = convert_content(message.content.as_ref())?;
        let mut table = Vec::new();

        for call in message.tool_calls.iter().flatten() {
            parts.push(Part { function_call: Some(convert_tool_call(call)?), ..Part::default() });
            table.push((call.id.clone(), call.function.name.clone()));
        }

        if parts.is_empty() {
            parts.push(Part::text(""));
        }

        let pending = (!table.is_empty()).then(|| PendingCalls {
            responses: vec![None; table.len()],
            calls: table,
        });

        Ok((Content { role: Some("model".to_string()), parts }, pending))
    }

    /// Emit the `function` turn for answered calls, in call order.
    fn flush_responses(&self, pending: PendingCalls, contents: &mut Vec<Content>) {
        let total = pending.calls.len();
        let parts: Vec<Part> = pending.responses.into_iter().flatten().collect();
        if parts.len() < total {
            self.debug(&format!("{} of {} tool call(s) left unanswered", total - parts.len(), total));
        }
        if !parts.is_empty() {
            contents.push(Content { role: Some("function".to_string()), parts });
        }
    }

    ///
    /// Apply the `extra_body.google` vendor block.
    ///
    /// # Arguments
    ///  * `extra` - the caller's `extra_body` value
    ///  * `body` - request being built
    fn apply_vendor_options(&self, extra: &Value, body: &mut GenerateContentRequest) -> Result<()> {
        let Some(google) = extra.get("google") else {
            return Ok(());
        };
        let Some(options) = google.as_object() else {
            return Err(ProxyError::InvalidRequest("extra_body.google must be an object".to_string()));
        };

        for (key, value) in options {
            match key.as_str() {
                "cached_content" => {
                    let name = value.as_str().ok_or_else(|| {
                        ProxyError::InvalidRequest("cached_content must be a string".to_string())
                    })?;
                    body.cached_content = Some(name.to_string());
                }
                "thinking_config" => {
                    body.generation_config.thinking_config = Some(camelize_keys(value));
                }
                "safety_settings" => {
                    let settings: Vec<SafetySetting> = serde_json::from_value::<Vec<Value>>(
                        value.clone(),
                    )
                    .map_err(|_| {
                        ProxyError::InvalidRequest("safety_settings must be a list".to_string())
                    })?
                    .iter()
                    .map(parse_safety_setting)
                    .collect::<Result<_>>()?;
                    body.safety_settings = settings;
                }
                other => self.debug(&format!("Ignoring unknown extra_body.google key '{}'", other)),
            }
        }
        Ok(())
    }

    ///
    /// Log debug message if trace logging is enabled.
    ///
    /// # Arguments
    ///  * `msg` - debug message to log
    pub(crate) fn debug(&self, msg: &str) {
        if self.log_level.is_trace_enabled() {
            tracing::debug!("[TRACE] {}", msg);
        }
    }
}

/* --- utility functions ---------------------------------------------------------------------- */

fn resolve_in_families(requested: Option<&str>, families: &[&str], fallback: &str) -> String {
    match requested.map(strip_model_prefix) {
        Some(name) if families.iter().any(|family| name.starts_with(family)) => name.to_string(),
        _ => fallback.to_string(),
    }
}

///
/// Convert OpenAI message content into Gemini parts.
///
/// # Returns
///  * parts in their original order
///  * `ProxyError::InvalidRequest` for unknown part types
///  * `ProxyError::UnsupportedFeature` for remote image URLs
fn convert_content(content: Option<&MessageContent>) -> Result<Vec<Part>> {
    match content {
        None => Ok(Vec::new()),
        Some(MessageContent::Text(text)) => Ok(vec![Part::text(text.clone())]),
        Some(MessageContent::Parts(parts)) => parts.iter().map(convert_part).collect(),
    }
}

fn convert_part(part: &ContentPart) -> Result<Part> {
    match part.kind.as_str() {
        "text" => Ok(Part::text(part.text.clone().unwrap_or_default())),
        "image_url" => {
            let url = part.image_url.as_ref().map(|i| i.url.as_str()).ok_or_else(|| {
                ProxyError::InvalidRequest("image_url part without a url".to_string())
            })?;
            Ok(Part { inline_data: Some(parse_data_url(url)?), ..Part::default() })
        }
        "input_audio" => {
            let audio = part.input_audio.as_ref().ok_or_else(|| {
                ProxyError::InvalidRequest("input_audio part without data".to_string())
            })?;
            Ok(Part {
                inline_data: Some(Blob {
                    mime_type: format!("audio/{}", audio.format),
                    data: audio.data.clone(),
                }),
                ..Part::default()
            })
        }
        other => Err(ProxyError::InvalidRequest(format!("unknown content part type '{}'", other))),
    }
}

///
/// Split a `data:<mime>;base64,<payload>` URL into an inline blob.
fn parse_data_url(url: &str) -> Result<Blob> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Err(ProxyError::UnsupportedFeature(
            "remote image URLs are not supported, send the image as a data URL".to_string(),
        ));
    };
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| ProxyError::InvalidRequest("malformed data URL".to_string()))?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ProxyError::InvalidRequest("data URL must be base64 encoded".to_string()))?;

    Ok(Blob { mime_type: mime_type.to_string(), data: data.to_string() })
}

fn convert_tool_call(call: &ToolCall) -> Result<FunctionCall> {
    if call.kind != "function" {
        return Err(ProxyError::InvalidRequest(format!(
            "unsupported tool call type '{}'",
            call.kind
        )));
    }

    let args = match &call.function.arguments {
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ProxyError::InvalidRequest(format!(
                "arguments of tool call '{}' are not valid JSON: {}",
                call.id, e
            ))
        })?,
        Value::Object(_) => call.function.arguments.clone(),
        _ => {
            return Err(ProxyError::InvalidRequest(format!(
                "arguments of tool call '{}' must be a JSON string",
                call.id
            )));
        }
    };

    Ok(FunctionCall { id: forwarded_id(&call.id), name: call.function.name.clone(), args })
}

///
/// Place one tool result into the pending call table.
///
/// # Returns
///  * `ProxyError::InvalidRequest` when the call id is missing, unknown or answered twice
fn attach_tool_result(message: &ChatMessage, pending: &mut PendingCalls) -> Result<()> {
    let call_id = message
        .tool_call_id
        .as_deref()
        .ok_or_else(|| ProxyError::InvalidRequest("tool message without tool_call_id".to_string()))?;

    let index = pending.calls.iter().position(|(id, _)| id == call_id).ok_or_else(|| {
        ProxyError::InvalidRequest(format!("unknown tool_call_id '{}'", call_id))
    })?;

    if pending.responses[index].is_some() {
        return Err(ProxyError::InvalidRequest(format!("duplicate tool_call_id '{}'", call_id)));
    }

    let text = match &message.content {
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => {
            parts.iter().filter_map(|p| p.text.as_deref()).collect::<Vec<_>>().join("")
        }
        None => String::new(),
    };
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": text }),
    };

    pending.responses[index] = Some(Part {
        function_response: Some(FunctionResponse {
            id: forwarded_id(call_id),
            name: pending.calls[index].1.clone(),
            response,
        }),
        ..Part::default()
    });
    Ok(())
}

/// Synthetic ids minted by this gateway are never sent back upstream.
fn forwarded_id(id: &str) -> Option<String> {
    (!id.starts_with(SYNTHETIC_CALL_PREFIX)).then(|| id.to_string())
}

fn translate_tools(tools: Option<&[ToolDefinition]>) -> Option<Vec<Tool>> {
    let declarations: Vec<FunctionDeclaration> = tools?
        .iter()
        .filter(|tool| tool.kind == "function")
        .filter_map(|tool| tool.function.as_ref())
        .map(|function| FunctionDeclaration {
            name: function.name.clone(),
            description: function.description.clone(),
            parameters: function.parameters.as_ref().map(strip_schema),
        })
        .collect();

    (!declarations.is_empty()).then(|| vec![Tool { function_declarations: declarations }])
}

fn translate_tool_choice(choice: &Value) -> Result<ToolConfig> {
    let (mode, allowed) = match choice {
        Value::String(mode) => match mode.as_str() {
            "none" => ("NONE", None),
            "auto" => ("AUTO", None),
            "required" => ("ANY", None),
            other => {
                return Err(ProxyError::InvalidRequest(format!("unknown tool_choice '{}'", other)));
            }
        },
        Value::Object(_) => {
            let name = choice
                .pointer("/function/name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ProxyError::InvalidRequest("tool_choice object must name a function".to_string())
                })?;
            ("ANY", Some(vec![name.to_string()]))
        }
        _ => return Err(ProxyError::InvalidRequest("invalid tool_choice".to_string())),
    };

    Ok(ToolConfig {
        function_calling_config: FunctionCallingConfig { mode, allowed_function_names: allowed },
    })
}

///
/// Map OpenAI sampling fields onto the Gemini generation config.
fn translate_generation(request: &ChatCompletionRequest) -> Result<GenerationConfig> {
    let mut config = GenerationConfig {
        max_output_tokens: request.max_completion_tokens.or(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        candidate_count: request.n,
        stop_sequences: request.stop.clone().map(|s| s.into_vec()),
        presence_penalty: request.presence_penalty,
        frequency_penalty: request.frequency_penalty,
        seed: request.seed,
        ..GenerationConfig::default()
    };

    if let Some(effort) = &request.reasoning_effort {
        let budget = match effort.as_str() {
            "none" => 0,
            "low" => 1024,
            "medium" => 8192,
            "high" => 24576,
            other => {
                return Err(ProxyError::UnsupportedFeature(format!(
                    "reasoning_effort '{}' is not supported",
                    other
                )));
            }
        };
        config.thinking_config = Some(json!({ "thinkingBudget": budget }));
    }

    if let Some(format) = &request.response_format {
        apply_response_format(format, &mut config)?;
    }

    Ok(config)
}

fn apply_response_format(format: &ResponseFormat, config: &mut GenerationConfig) -> Result<()> {
    match format.kind.as_str() {
        "text" => config.response_mime_type = Some("text/plain".to_string()),
        "json_object" => config.response_mime_type = Some("application/json".to_string()),
        "json_schema" => {
            let schema = format
                .json_schema
                .as_ref()
                .and_then(|s| s.schema.as_ref())
                .ok_or_else(|| {
                    ProxyError::InvalidRequest(
                        "response_format json_schema requires a schema".to_string(),
                    )
                })?;
            let is_string_enum = schema.get("type").and_then(Value::as_str) == Some("string")
                && schema.get("enum").is_some();
            config.response_mime_type = Some(
                if is_string_enum { "text/x.enum" } else { "application/json" }.to_string(),
            );
            config.response_schema = Some(strip_schema(schema));
        }
        other => {
            return Err(ProxyError::UnsupportedFeature(format!(
                "response_format type '{}' is not supported",
                other
            )));
        }
    }
    Ok(())
}

/// Recursively remove schema keywords the upstream does not accept.
fn strip_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), strip_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_schema).collect()),
        other => other.clone(),
    }
}

fn default_safety_settings() -> Vec<SafetySetting> {
    HARM_CATEGORIES
        .iter()
        .map(|category| SafetySetting {
            category: category.to_string(),
            threshold: "BLOCK_NONE".to_string(),
        })
        .collect()
}

fn parse_safety_setting(value: &Value) -> Result<SafetySetting> {
    let field = |name: &str| {
        value.get(name).and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
            ProxyError::InvalidRequest(format!("safety setting is missing '{}'", name))
        })
    };
    Ok(SafetySetting { category: field("category")?, threshold: field("threshold")? })
}

/// Rewrite snake_case object keys to camelCase, one level deep.
fn camelize_keys(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    let camel: Map<String, Value> = map
        .iter()
        .map(|(key, v)| {
            let mut out = String::with_capacity(key.len());
            let mut upper = false;
            for c in key.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            (out, v.clone())
        })
        .collect();
    Value::Object(camel)
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn translator() -> RequestTranslator {
        RequestTranslator::new(LogLevel::Info, &UpstreamConfig::default())
    }

    fn request(body: Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_model_resolution() {
        let t = translator();
        assert_eq!(t.resolve_model(Some("models/gemini-2.5-pro")), "gemini-2.5-pro");
        assert_eq!(t.resolve_model(Some("gemma-3-27b-it")), "gemma-3-27b-it");
        assert_eq!(t.resolve_model(Some("gpt-4o")), "gemini-2.5-flash");
        assert_eq!(t.resolve_model(None), "gemini-2.5-flash");
    }

    #[test]
    fn test_system_messages_become_instruction() {
        let call = translator()
            .translate_chat(request(json!({
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hi"},
                    {"role": "system", "content": "Use English."}
                ]
            })))
            .unwrap();

        let system = call.body.system_instruction.unwrap();
        assert_eq!(system.parts.len(), 2);
        assert_eq!(system.parts[1].text.as_deref(), Some("Use English."));
        assert_eq!(call.body.contents.len(), 1);
        assert_eq!(call.body.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn test_system_only_gets_placeholder_turn() {
        let call = translator()
            .translate_chat(request(json!({"messages": [{"role": "system", "content": "x"}]})))
            .unwrap();
        assert_eq!(call.body.contents.len(), 1);
        assert_eq!(call.body.contents[0].role.as_deref(), Some("model"));
        assert_eq!(call.body.contents[0].parts[0].text.as_deref(), Some(" "));
    }

    #[test]
    fn test_empty_conversation_rejected() {
        let err = translator().translate_chat(request(json!({"messages": []}))).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[test]
    fn test_tool_results_follow_call_order() {
        let call = translator()
            .translate_chat(request(json!({
                "messages": [
                    {"role": "user", "content": "Weather in Oslo and Rome?"},
                    {"role": "assistant", "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}},
                        {"id": "upstream-b", "type": "function",
                         "function": {"name": "weather", "arguments": "{\"city\":\"Rome\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "upstream-b", "content": "{\"temp\": 21}"},
                    {"role": "tool", "tool_call_id": "call_a", "content": "cold"}
                ]
            })))
            .unwrap();

        let contents = &call.body.contents;
        assert_eq!(contents.len(), 3);
        let model_turn = &contents[1];
        assert_eq!(model_turn.role.as_deref(), Some("model"));
        let first_call = model_turn.parts[0].function_call.as_ref().unwrap();
        assert_eq!(first_call.id, None);
        assert_eq!(first_call.args, json!({"city": "Oslo"}));
        assert_eq!(model_turn.parts[1].function_call.as_ref().unwrap().id.as_deref(), Some("upstream-b"));

        let results = &contents[2];
        assert_eq!(results.role.as_deref(), Some("function"));
        let first = results.parts[0].function_response.as_ref().unwrap();
        assert_eq!(first.response, json!({"result": "cold"}));
        let second = results.parts[1].function_response.as_ref().unwrap();
        assert_eq!(second.response, json!({"temp": 21}));
        assert_eq!(second.id.as_deref(), Some("upstream-b"));
    }

    #[test]
    fn test_tool_correlation_errors() {
        let base = |tool: Value| {
            json!({"messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{}"}}
                ]},
                tool
            ]})
        };

        let unknown = base(json!({"role": "tool", "tool_call_id": "call_2", "content": "1"}));
        let missing = base(json!({"role": "tool", "content": "1"}));
        for body in [unknown, missing] {
            let err = translator().translate_chat(request(body)).unwrap_err();
            assert!(matches!(err, ProxyError::InvalidRequest(_)));
        }

        let mut duplicate = base(json!({"role": "tool", "tool_call_id": "call_1", "content": "1"}));
        duplicate["messages"]
            .as_array_mut()
            .unwrap()
            .push(json!({"role": "tool", "tool_call_id": "call_1", "content": "2"}));
        let err = translator().translate_chat(request(duplicate)).unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let orphan = json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "tool", "tool_call_id": "call_1", "content": "1"}
        ]});
        assert!(translator().translate_chat(request(orphan)).is_err());
    }

    #[test]
    fn test_content_parts() {
        let call = translator()
            .translate_chat(request(json!({"messages": [{"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBOR"}},
                {"type": "input_audio", "input_audio": {"data": "UklG", "format": "wav"}}
            ]}]})))
            .unwrap();
        let parts = &call.body.contents[0].parts;
        assert_eq!(parts[0].inline_data.as_ref().unwrap().mime_type, "image/png");
        assert_eq!(parts[1].inline_data.as_ref().unwrap().mime_type, "audio/wav");
        assert_eq!(parts[2].text.as_deref(), Some(""));

        let remote = translator().translate_chat(request(json!({"messages": [{"role": "user",
            "content": [{"type": "image_url", "image_url": {"url": "https://x/y.png"}}]}]})));
        assert!(matches!(remote, Err(ProxyError::UnsupportedFeature(_))));

        let unknown = translator().translate_chat(request(json!({"messages": [{"role": "user",
            "content": [{"type": "video", "text": "?"}]}]})));
        assert!(matches!(unknown, Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_generation_rename_table() {
        let call = translator()
            .translate_chat(request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 10, "max_completion_tokens": 20, "top_p": 0.5, "top_k": 4,
                "n": 2, "stop": ["a", "b"], "presence_penalty": 0.1, "seed": 7,
                "reasoning_effort": "low"
            })))
            .unwrap();
        let value = serde_json::to_value(&call.body).unwrap();
        let generation = &value["generationConfig"];
        assert_eq!(generation["maxOutputTokens"], 20);
        assert_eq!(generation["topP"], 0.5);
        assert_eq!(generation["topK"], 4);
        assert_eq!(generation["candidateCount"], 2);
        assert_eq!(generation["stopSequences"], json!(["a", "b"]));
        assert_eq!(generation["seed"], 7);
        assert_eq!(generation["thinkingConfig"]["thinkingBudget"], 1024);
        assert_eq!(value["safetySettings"].as_array().unwrap().len(), HARM_CATEGORIES.len());
    }

    #[test]
    fn test_response_format_variants() {
        let with_format = |format: Value| {
            translator().translate_chat(request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "response_format": format
            })))
        };

        let schema = with_format(json!({"type": "json_schema", "json_schema": {"name": "x",
            "schema": {"type": "object", "additionalProperties": false,
                       "properties": {"a": {"type": "string"}}}}}))
        .unwrap();
        let generation = &schema.body.generation_config;
        assert_eq!(generation.response_mime_type.as_deref(), Some("application/json"));
        assert!(generation.response_schema.as_ref().unwrap().get("additionalProperties").is_none());

        let enumeration = with_format(json!({"type": "json_schema", "json_schema": {
            "schema": {"type": "string", "enum": ["a", "b"]}}}))
        .unwrap();
        assert_eq!(
            enumeration.body.generation_config.response_mime_type.as_deref(),
            Some("text/x.enum")
        );

        assert!(matches!(
            with_format(json!({"type": "json_schema", "json_schema": {"name": "x"}})),
            Err(ProxyError::InvalidRequest(_))
        ));
        assert!(matches!(
            with_format(json!({"type": "grammar"})),
            Err(ProxyError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_tools_and_choice() {
        let call = translator()
            .translate_chat(request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "f",
                    "parameters": {"$schema": "x", "type": "object", "strict": true}}}],
                "tool_choice": {"type": "function", "function": {"name": "f"}}
            })))
            .unwrap();
        let tools = call.body.tools.unwrap();
        assert_eq!(tools[0].function_declarations[0].parameters, Some(json!({"type": "object"})));
        let config = call.body.tool_config.unwrap().function_calling_config;
        assert_eq!(config.mode, "ANY");
        assert_eq!(config.allowed_function_names, Some(vec!["f".to_string()]));

        assert!(translate_tool_choice(&json!("sometimes")).is_err());
        assert_eq!(translate_tool_choice(&json!("none")).unwrap().function_calling_config.mode, "NONE");
    }

    #[test]
    fn test_vendor_options() {
        let call = translator()
            .translate_chat(request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "extra_body": {"google": {
                    "cached_content": "cachedContents/abc",
                    "thinking_config": {"thinking_budget": 0, "include_thoughts": false},
                    "safety_settings": [{"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_LOW_AND_ABOVE"}],
                    "something_else": 1
                }}
            })))
            .unwrap();
        assert_eq!(call.body.cached_content.as_deref(), Some("cachedContents/abc"));
        assert_eq!(call.body.safety_settings.len(), 1);
        assert_eq!(
            call.body.generation_config.thinking_config,
            Some(json!({"thinkingBudget": 0, "includeThoughts": false}))
        );

        let bad = translator().translate_chat(request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "extra_body": {"google": "nope"}
        })));
        assert!(matches!(bad, Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_embeddings_translation() {
        let call = translator()
            .translate_embeddings(
                serde_json::from_value(json!({"input": ["a", "b"], "dimensions": 256})).unwrap(),
            )
            .unwrap();
        assert_eq!(call.model, "text-embedding-004");
        assert_eq!(call.body.requests.len(), 2);
        assert_eq!(call.body.requests[1].model, "models/text-embedding-004");
        assert_eq!(call.body.requests[0].output_dimensionality, Some(256));

        let empty = translator()
            .translate_embeddings(serde_json::from_value(json!({"input": []})).unwrap());
        assert!(matches!(empty, Err(ProxyError::InvalidRequest(_))));

        let base64 = translator().translate_embeddings(
            serde_json::from_value(json!({"input": "a", "encoding_format": "base64"})).unwrap(),
        );
        assert!(matches!(base64, Err(ProxyError::UnsupportedFeature(_))));
    }
}
