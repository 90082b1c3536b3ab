//!
//! Gemini to OpenAI response assembly.
//!
//! Maps a complete `generateContent` answer onto an OpenAI chat completion,
//! and the embeddings and model listings onto their OpenAI shapes. The
//! candidate, finish-reason and usage helpers are shared with the streaming
//! re-emitter.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use tracing::warn;

use crate::config::LogLevel;
use crate::converter::gemini::{
    BatchEmbedResponse, Candidate, Content, GenerateContentResponse, ModelListResponse,
    UsageMetadata,
};
use crate::converter::openai::{
    AssistantMessage, ChatCompletion, Choice, CompletionTokensDetails, EmbeddingData,
    EmbeddingsResponse, FunctionCallOut, ModelEntry, ModelList, PromptTokensDetails, ToolCallOut,
    Usage,
};
use crate::converter::{completion_id, strip_model_prefix, tool_call_id};
use crate::error::Result;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Assembler for non-streaming Gemini answers.
pub struct ResponseAssembler {
    /** logging level for payload dumps */
    log_level: LogLevel,
}

///
/// Visible output of one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateOutput {
    /** text fragments joined with [`TEXT_SEPARATOR`]; `None` when there was no text */
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallOut>,
}

/* --- constants ------------------------------------------------------------------------------ */

/** joins separate text parts of one candidate */
pub const TEXT_SEPARATOR: &str = "\n\n|>";

/** finish reason used for blocked prompts and safety stops */
pub const CONTENT_FILTER: &str = "content_filter";

/* --- start of code -------------------------------------------------------------------------- */

impl ResponseAssembler {
    pub fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }

    ///
    /// Build an OpenAI chat completion from a Gemini answer.
    ///
    /// A response without candidates yields exactly one choice with a null
    /// message and a `content_filter` finish reason.
    ///
    /// # Arguments
    ///  * `response` - parsed upstream answer
    ///  * `model` - model name reported when the upstream gives no version
    ///
    /// # Returns
    ///  * OpenAI chat completion
    pub fn assemble(&self, response: GenerateContentResponse, model: &str) -> ChatCompletion {
        let usage = response.usage_metadata.as_ref().map(map_usage);
        let block_reason = response.block_reason().map(str::to_string);
        let model = response.model_version.clone().unwrap_or_else(|| model.to_string());
        let candidates = response.candidates.unwrap_or_default();

        let choices = if candidates.is_empty() {
            warn!(
                "Upstream returned no candidates (block reason: {})",
                block_reason.as_deref().unwrap_or("none")
            );
            vec![Choice {
                index: 0,
                message: None,
                logprobs: None,
                finish_reason: Some(CONTENT_FILTER.to_string()),
            }]
        } else {
            candidates
                .iter()
                .enumerate()
                .map(|(position, candidate)| self.assemble_choice(position, candidate))
                .collect()
        };

        self.debug(&format!("Assembled {} choice(s) for {}", choices.len(), model));

        ChatCompletion {
            id: completion_id(),
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model,
            choices,
            usage,
        }
    }

    ///
    /// Map a batch embedding answer onto the OpenAI list shape.
    pub fn map_embeddings(&self, response: BatchEmbedResponse, model: &str) -> EmbeddingsResponse {
        EmbeddingsResponse {
            object: "list",
            data: response
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(index, embedding)| EmbeddingData {
                    object: "embedding",
                    index,
                    embedding: embedding.values,
                })
                .collect(),
            model: model.to_string(),
        }
    }

    /// Map the upstream model listing onto the OpenAI list shape.
    pub fn map_models(&self, response: ModelListResponse) -> ModelList {
        ModelList {
            object: "list",
            data: response
                .models
                .into_iter()
                .map(|info| ModelEntry {
                    id: strip_model_prefix(&info.name).to_string(),
                    object: "model",
                    created: 0,
                    owned_by: "google",
                })
                .collect(),
        }
    }

    /// Parse and assemble a raw upstream body.
    pub fn assemble_bytes(&self, body: &[u8], model: &str) -> Result<ChatCompletion> {
        if self.log_level.is_trace_enabled() {
            self.debug(&format!("Gemini response: {}", String::from_utf8_lossy(body)));
        }
        let response: GenerateContentResponse = serde_json::from_slice(body)?;
        Ok(self.assemble(response, model))
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn assemble_choice(&self, position: usize, candidate: &Candidate) -> Choice {
        let output = candidate.content.as_ref().map(|c| candidate_output(c, false)).unwrap_or_default();
        let finish_reason = candidate_finish_reason(candidate, &output);
        let tool_calls = (!output.tool_calls.is_empty()).then_some(output.tool_calls);

        Choice {
            index: candidate.index.unwrap_or(position as u32),
            message: Some(AssistantMessage { role: "assistant", content: output.content, tool_calls }),
            logprobs: None,
            finish_reason,
        }
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

///
/// Extract text and tool calls from a candidate's content.
///
/// # Arguments
///  * `content` - candidate content
///  * `streaming` - whether tool calls should carry their position index
///
/// # Returns
///  * visible output, thought parts excluded
pub fn candidate_output(content: &Content, streaming: bool) -> CandidateOutput {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in content.parts.iter().filter(|p| p.thought != Some(true)) {
        if let Some(text) = &part.text {
            texts.push(text.as_str());
        }
        if let Some(call) = &part.function_call {
            tool_calls.push(ToolCallOut {
                index: streaming.then_some(tool_calls.len() as u32),
                id: call.id.clone().unwrap_or_else(tool_call_id),
                kind: "function",
                function: FunctionCallOut {
                    name: call.name.clone(),
                    arguments: call.args.to_string(),
                },
            });
        }
    }

    let content = (!texts.is_empty()).then(|| texts.join(TEXT_SEPARATOR)).filter(|t| !t.is_empty());
    CandidateOutput { content, tool_calls }
}

/// Finish reason of a candidate, `tool_calls` when it made any.
pub fn candidate_finish_reason(candidate: &Candidate, output: &CandidateOutput) -> Option<String> {
    if !output.tool_calls.is_empty() && candidate.finish_reason.is_some() {
        return Some("tool_calls".to_string());
    }
    candidate.finish_reason.as_deref().map(map_finish_reason)
}

///
/// Map a Gemini finish reason onto the OpenAI vocabulary.
///
/// Unknown values pass through unchanged.
pub fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            CONTENT_FILTER
        }
        other => other,
    }
    .to_string()
}

///
/// Sum the upstream token counters into OpenAI usage. Missing counters count as zero.
pub fn map_usage(metadata: &UsageMetadata) -> Usage {
    let prompt = metadata.prompt_token_count.unwrap_or(0)
        + metadata.tool_use_prompt_token_count.unwrap_or(0);
    let completion =
        metadata.candidates_token_count.unwrap_or(0) + metadata.thoughts_token_count.unwrap_or(0);

    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
        prompt_tokens_details: metadata
            .cached_content_token_count
            .map(|cached_tokens| PromptTokensDetails { cached_tokens }),
        completion_tokens_details: metadata
            .thoughts_token_count
            .map(|reasoning_tokens| CompletionTokensDetails { reasoning_tokens }),
    }
}

/* --- tests ------------------------------------------------------------------------------- */
