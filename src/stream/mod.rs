//!
//! Streaming pipeline from Gemini SSE to OpenAI chunk SSE.
//!
//! Two stages run per request: the [`EventFramer`] cuts the raw byte stream
//! into logical events, the [`ChunkReemitter`] rewrites each event into the
//! OpenAI delta protocol. [`forward`] drives both from an upstream byte
//! stream into a bounded channel and stops reading as soon as the consumer
//! goes away.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod framer;
pub mod reemitter;

/* --- uses ------------------------------------------------------------------------------------ */

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::LogLevel;
use crate::converter::openai::Usage;

pub use framer::{EventFramer, FramedEvent};
pub use reemitter::{ChunkReemitter, DONE_LINE};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Both stages for one streamed request.
pub struct StreamPipeline {
    framer: EventFramer,
    reemitter: ChunkReemitter,
}

///
/// How a forwarded stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /** the closing chunks and `[DONE]` reached the consumer */
    pub completed: bool,
    /** upstream failed mid-stream */
    pub upstream_failed: bool,
    /** last usage total reported upstream */
    pub total_tokens: Option<u64>,
}

/* --- start of code -------------------------------------------------------------------------- */

impl StreamPipeline {
    ///
    /// Create a pipeline for one request.
    ///
    /// # Arguments
    ///  * `model` - model reported on every chunk
    ///  * `include_usage` - attach usage to the terminal chunks
    ///  * `log_level` - logging level for payload dumps
    pub fn new(model: impl Into<String>, include_usage: bool, log_level: LogLevel) -> Self {
        Self {
            framer: EventFramer::new(),
            reemitter: ChunkReemitter::new(model, include_usage, log_level),
        }
    }

    /// Feed raw upstream bytes, returning the outbound lines they complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let events = self.framer.push(chunk);
        events.into_iter().flat_map(|event| self.reemitter.process(event)).collect()
    }

    /// Flush the framer remainder, the terminal chunks and `[DONE]`.
    pub fn finish(&mut self) -> Vec<String> {
        let mut lines = match self.framer.finish() {
            Some(event) => self.reemitter.process(event),
            None => Vec::new(),
        };
        lines.extend(self.reemitter.finish());
        lines
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.reemitter.usage()
    }

    pub fn completion_id(&self) -> &str {
        self.reemitter.id()
    }
}

///
/// Pump an upstream byte stream through a pipeline into a channel.
///
/// Reading stops when the receiver is dropped, which drops the upstream
/// stream with it. An upstream error ends the stream early but the closing
/// chunks are still sent.
///
/// # Arguments
///  * `upstream` - raw upstream body
///  * `pipeline` - per-request pipeline state
///  * `tx` - outbound channel feeding the response body
///
/// # Returns
///  * summary used for usage accounting
pub async fn forward<S, E>(
    mut upstream: S,
    mut pipeline: StreamPipeline,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
) -> StreamSummary
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut upstream_failed = false;

    while let Some(item) = upstream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Upstream stream error: {}", e);
                upstream_failed = true;
                break;
            }
        };

        for line in pipeline.push(&chunk) {
            if tx.send(Ok(Bytes::from(line))).await.is_err() {
                debug!("Client went away, closing upstream stream");
                return summary(&pipeline, false, upstream_failed);
            }
        }
    }
    drop(upstream);

    for line in pipeline.finish() {
        if tx.send(Ok(Bytes::from(line))).await.is_err() {
            debug!("Client went away before the stream was closed");
            return summary(&pipeline, false, upstream_failed);
        }
    }

    summary(&pipeline, true, upstream_failed)
}

/* --- utility functions ---------------------------------------------------------------------- */

fn summary(pipeline: &StreamPipeline, completed: bool, upstream_failed: bool) -> StreamSummary {
    StreamSummary {
        completed,
        upstream_failed,
        total_tokens: pipeline.usage().map(|u| u.total_tokens),
    }
}

/* --- tests ------------------------------------------------------------------------------- */
