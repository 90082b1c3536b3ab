//!
//! Chunk re-emitter.
//!
//! Turns framed Gemini stream events into OpenAI `chat.completion.chunk`
//! lines. Per choice index the first delta announces the role, later deltas
//! carry only new text or tool calls, and the finish reason (plus usage, when
//! requested) travels on one terminal chunk flushed at close.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, warn};

use crate::config::LogLevel;
use crate::converter::completion_id;
use crate::converter::gemini::{Candidate, GenerateContentResponse};
use crate::converter::gemini_to_openai::{
    CONTENT_FILTER, candidate_finish_reason, candidate_output, map_usage,
};
use crate::converter::openai::{ChatCompletionChunk, ChunkChoice, Delta, Usage};
use crate::stream::framer::FramedEvent;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Per-request re-emitter state.
pub struct ChunkReemitter {
    /** completion id shared by every chunk of the stream */
    id: String,
    model: String,
    created: i64,
    /** attach usage to terminal chunks */
    include_usage: bool,
    /** choice indexes whose role was announced */
    announced: BTreeSet<u32>,
    /** last finish reason seen per choice index */
    finish: BTreeMap<u32, Option<String>>,
    /** choice indexes that produced tool calls */
    with_tool_calls: BTreeSet<u32>,
    /** next tool call position per choice index, across events */
    next_tool_index: BTreeMap<u32, u32>,
    /** latest usage reported upstream */
    usage: Option<Usage>,
    log_level: LogLevel,
}

/* --- constants ------------------------------------------------------------------------------ */

/** sentinel closing every stream */
pub const DONE_LINE: &str = "data: [DONE]\n\n";

/* --- start of code -------------------------------------------------------------------------- */

impl ChunkReemitter {
    ///
    /// Create the state for one streamed request.
    ///
    /// # Arguments
    ///  * `model` - model name reported on every chunk
    ///  * `include_usage` - whether terminal chunks carry usage
    ///  * `log_level` - logging level for payload dumps
    pub fn new(model: impl Into<String>, include_usage: bool, log_level: LogLevel) -> Self {
        Self {
            id: completion_id(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            include_usage,
            announced: BTreeSet::new(),
            finish: BTreeMap::new(),
            with_tool_calls: BTreeSet::new(),
            next_tool_index: BTreeMap::new(),
            usage: None,
            log_level,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest usage seen upstream.
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    ///
    /// Re-emit one framed event.
    ///
    /// # Arguments
    ///  * `event` - event produced by the framer
    ///
    /// # Returns
    ///  * complete `data: ...\n\n` lines to send downstream
    pub fn process(&mut self, event: FramedEvent) -> Vec<String> {
        let Some(payload) = event.payload.as_deref() else {
            return vec![passthrough(&event)];
        };
        if payload.trim() == "[DONE]" {
            return Vec::new();
        }

        if self.log_level.is_trace_enabled() {
            tracing::debug!("[TRACE] Stream event: {}", payload);
        }

        let response = match serde_json::from_str::<GenerateContentResponse>(payload) {
            Ok(response) => response,
            Err(e) => {
                warn!("Passing through unparseable stream event: {}", e);
                return vec![passthrough(&event)];
            }
        };

        if let Some(metadata) = &response.usage_metadata {
            self.usage = Some(map_usage(metadata));
        }

        match response.candidates.as_deref() {
            Some(candidates) if !candidates.is_empty() => candidates
                .iter()
                .enumerate()
                .flat_map(|(position, candidate)| self.process_candidate(position, candidate))
                .collect(),
            _ => match response.block_reason() {
                Some(reason) => {
                    warn!("Upstream blocked the prompt: {}", reason);
                    let lines = self.announce(0).into_iter().collect();
                    self.finish.insert(0, Some(CONTENT_FILTER.to_string()));
                    lines
                }
                None if response.usage_metadata.is_some() && response.candidates.is_some() => {
                    Vec::new()
                }
                None => {
                    warn!("Passing through stream event without candidates");
                    vec![passthrough(&event)]
                }
            },
        }
    }

    ///
    /// Close the stream.
    ///
    /// # Returns
    ///  * one terminal chunk per choice index in ascending order, then `[DONE]`
    pub fn finish(&mut self) -> Vec<String> {
        let usage = if self.include_usage { self.usage.clone() } else { None };
        let finish = std::mem::take(&mut self.finish);

        let mut lines: Vec<String> = finish
            .into_iter()
            .filter_map(|(index, reason)| {
                let mut chunk = self.chunk(index, Delta::default(), reason);
                chunk.usage = usage.clone();
                encode(&chunk)
            })
            .collect();
        lines.push(DONE_LINE.to_string());
        lines
    }

    /* --- private methods ----------------------------------------------------------------- */

    fn process_candidate(&mut self, position: usize, candidate: &Candidate) -> Vec<String> {
        let index = candidate.index.unwrap_or(position as u32);
        let mut lines: Vec<String> = self.announce(index).into_iter().collect();

        let mut output = candidate.content.as_ref().map(|c| candidate_output(c, true)).unwrap_or_default();
        if !output.tool_calls.is_empty() {
            self.with_tool_calls.insert(index);
            let next = self.next_tool_index.entry(index).or_insert(0);
            for call in output.tool_calls.iter_mut() {
                call.index = Some(*next + call.index.unwrap_or(0));
            }
            *next += output.tool_calls.len() as u32;
        }

        let slot = self.finish.entry(index).or_insert(None);
        if candidate.finish_reason.is_some() {
            let reason = candidate_finish_reason(candidate, &output);
            *slot = if self.with_tool_calls.contains(&index) {
                Some("tool_calls".to_string())
            } else {
                reason
            };
        }

        let delta = Delta {
            role: None,
            content: output.content,
            tool_calls: (!output.tool_calls.is_empty()).then_some(output.tool_calls),
        };
        if !delta.is_empty() {
            lines.extend(encode(&self.chunk(index, delta, None)));
        }
        lines
    }

    /// Role announcement for an index seen for the first time.
    fn announce(&mut self, index: u32) -> Option<String> {
        if !self.announced.insert(index) {
            return None;
        }
        let delta = Delta { role: Some("assistant"), content: Some(String::new()), tool_calls: None };
        encode(&self.chunk(index, delta, None))
    }

    fn chunk(&self, index: u32, delta: Delta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice { index, delta, logprobs: None, finish_reason }],
            usage: None,
        }
    }
}

/* --- utility functions ---------------------------------------------------------------------- */

fn encode(chunk: &ChatCompletionChunk) -> Option<String> {
    match serde_json::to_string(chunk) {
        Ok(json) => Some(format!("data: {}\n\n", json)),
        Err(e) => {
            error!("Failed to serialize chunk: {}", e);
            None
        }
    }
}

/// Forward an event verbatim, re-terminated.
fn passthrough(event: &FramedEvent) -> String {
    format!("{}\n\n", event.raw.trim_end_matches(['\n', '\r']))
}

/* --- tests ------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn event(payload: Value) -> FramedEvent {
        let text = payload.to_string();
        FramedEvent { raw: format!("data: {}", text), payload: Some(text), terminated: true }
    }

    fn parse(line: &str) -> Value {
        let body = line.strip_prefix("data: ").unwrap().trim_end();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_role_announced_once_and_finish_withheld() {
        let mut reemitter = ChunkReemitter::new("gemini-2.5-flash", false, LogLevel::Info);
        let first = reemitter.process(event(json!({"candidates": [
            {"content": {"parts": [{"text": "Hel"}]}, "index": 0}
        ]})));
        let second = reemitter.process(event(json!({"candidates": [
            {"content": {"parts": [{"text": "lo"}]}, "finishReason": "STOP", "index": 0}
        ]})));

        assert_eq!(first.len(), 2);
        let announce = parse(&first[0]);
        assert_eq!(announce["choices"][0]["delta"], json!({"role": "assistant", "content": ""}));
        assert_eq!(parse(&first[1])["choices"][0]["delta"], json!({"content": "Hel"}));

        assert_eq!(second.len(), 1);
        let delta = parse(&second[0]);
        assert_eq!(delta["choices"][0]["delta"], json!({"content": "lo"}));
        assert_eq!(delta["choices"][0]["finish_reason"], Value::Null);

        let closing = reemitter.finish();
        assert_eq!(closing.len(), 2);
        let terminal = parse(&closing[0]);
        assert_eq!(terminal["choices"][0]["delta"], json!({}));
        assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
        assert!(terminal.get("usage").is_none());
        assert_eq!(closing[1], DONE_LINE);
        assert_eq!(terminal["id"], announce["id"]);
    }

    #[test]
    fn test_empty_deltas_suppressed() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        reemitter.process(event(json!({"candidates": [{"content": {"parts": [{"text": "a"}]}}]})));
        let lines = reemitter.process(event(json!({"candidates": [
            {"content": {"parts": [{"text": "thinking", "thought": true}]}}
        ]})));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_usage_only_on_terminal_when_requested() {
        let mut reemitter = ChunkReemitter::new("m", true, LogLevel::Info);
        let lines = reemitter.process(event(json!({
            "candidates": [{"content": {"parts": [{"text": "a"}]}, "finishReason": "MAX_TOKENS"}],
            "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 3}
        })));
        assert!(lines.iter().all(|l| parse(l).get("usage").is_none()));

        let closing = reemitter.finish();
        let terminal = parse(&closing[0]);
        assert_eq!(terminal["choices"][0]["finish_reason"], "length");
        assert_eq!(terminal["usage"]["total_tokens"], 5);
        assert_eq!(reemitter.usage().unwrap().total_tokens, 5);
    }

    #[test]
    fn test_terminals_in_index_order() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        reemitter.process(event(json!({"candidates": [
            {"content": {"parts": [{"text": "b"}]}, "index": 1, "finishReason": "STOP"},
            {"content": {"parts": [{"text": "a"}]}, "index": 0, "finishReason": "SAFETY"}
        ]})));
        let closing = reemitter.finish();
        assert_eq!(closing.len(), 3);
        assert_eq!(parse(&closing[0])["choices"][0]["index"], 0);
        assert_eq!(parse(&closing[0])["choices"][0]["finish_reason"], "content_filter");
        assert_eq!(parse(&closing[1])["choices"][0]["index"], 1);
    }

    #[test]
    fn test_tool_call_stream() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        let lines = reemitter.process(event(json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "lookup", "args": {"q": 1}}}
        ]}, "finishReason": "STOP"}]})));
        let delta = parse(&lines[1]);
        let call = &delta["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["index"], 0);
        assert_eq!(call["function"]["arguments"], "{\"q\":1}");
        let closing = reemitter.finish();
        assert_eq!(parse(&closing[0])["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn test_tool_calls_numbered_across_events() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        let first = reemitter.process(event(json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "a", "args": {"x": 1}}}
        ]}, "index": 0}]})));
        let second = reemitter.process(event(json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "b", "args": {"y": 2}}},
            {"functionCall": {"name": "c", "args": {}}}
        ]}, "index": 0}]})));
        let other = reemitter.process(event(json!({"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "d", "args": {}}}
        ]}, "index": 1}]})));

        let calls = |line: &str| parse(line)["choices"][0]["delta"]["tool_calls"].clone();
        assert_eq!(calls(&first[1])[0]["index"], 0);
        assert_eq!(calls(&first[1])[0]["function"]["name"], "a");
        assert_eq!(second.len(), 1);
        assert_eq!(calls(&second[0])[0]["index"], 1);
        assert_eq!(calls(&second[0])[0]["function"]["name"], "b");
        assert_eq!(calls(&second[0])[1]["index"], 2);
        assert_eq!(calls(&other[1])[0]["index"], 0, "each choice numbers its own calls");
    }

    #[test]
    fn test_blocked_prompt_without_candidates() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        let lines = reemitter.process(event(json!({"promptFeedback": {"blockReason": "OTHER"}})));
        assert_eq!(lines.len(), 1);
        assert_eq!(parse(&lines[0])["choices"][0]["delta"]["role"], "assistant");
        let closing = reemitter.finish();
        assert_eq!(parse(&closing[0])["choices"][0]["finish_reason"], "content_filter");
    }

    #[test]
    fn test_malformed_and_foreign_events_pass_through() {
        let mut reemitter = ChunkReemitter::new("m", false, LogLevel::Info);
        let garbage = FramedEvent {
            payload: Some("not json".into()),
            raw: "data: not json\n".into(),
            terminated: false,
        };
        assert_eq!(reemitter.process(garbage), vec!["data: not json\n\n".to_string()]);

        let error = reemitter.process(event(json!({"error": {"code": 500}})));
        assert_eq!(error, vec!["data: {\"error\":{\"code\":500}}\n\n".to_string()]);

        let done = FramedEvent { payload: Some("[DONE]".into()), raw: "data: [DONE]".into(), terminated: true };
        assert!(reemitter.process(done).is_empty());

        assert_eq!(reemitter.finish(), vec![DONE_LINE.to_string()]);
    }
}
