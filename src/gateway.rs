//!
//! Request orchestration.
//!
//! For every call the gateway translates the OpenAI body, resolves a key,
//! calls Gemini and maps the answer back. Pool keys get their outcome
//! recorded: successes append a usage record, upstream failures feed the
//! key's health counters. Transport failures leave the key untouched.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::sync::Arc;

use axum::http::HeaderMap;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::auth::CredentialLease;
use crate::config::{Config, LogLevel};
use crate::converter::gemini::{BatchEmbedResponse, ModelListResponse};
use crate::converter::openai::{
    ChatCompletion, ChatCompletionRequest, EmbeddingsRequest, EmbeddingsResponse, ModelList,
};
use crate::converter::{RequestTranslator, ResponseAssembler};
use crate::error::{ProxyError, Result};
use crate::pool::PoolScheduler;
use crate::store::{CredentialStore, UsageRecord};
use crate::stream::{self, StreamPipeline};
use crate::upstream::{GeminiClient, Method};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Everything needed to serve one OpenAI-compatible call.
pub struct Gateway {
    scheduler: Arc<PoolScheduler>,
    client: GeminiClient,
    translator: RequestTranslator,
    assembler: ResponseAssembler,
    log_level: LogLevel,
}

///
/// Outbound chat answer.
pub enum ChatReply {
    /** complete answer for `stream: false` */
    Complete(ChatCompletion),
    /** SSE lines fed by a background pump */
    Stream(ReceiverStream<std::result::Result<Bytes, std::io::Error>>),
}

/* --- constants ------------------------------------------------------------------------------ */

const CHAT_ENDPOINT: &str = "chat/completions";
const EMBEDDINGS_ENDPOINT: &str = "embeddings";
const MODELS_ENDPOINT: &str = "models";

/** Channel buffer size for streaming responses */
const STREAMING_CHANNEL_BUFFER: usize = 100;

/* --- start of code -------------------------------------------------------------------------- */

impl Gateway {
    ///
    /// Wire the gateway from configuration and a key store.
    ///
    /// # Arguments
    ///  * `config` - application configuration
    ///  * `store` - shared key store
    ///
    /// # Returns
    ///  * Ready gateway
    ///  * `ProxyError::Http` if the upstream client cannot be built
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let log_level = config.server.log_level;
        Ok(Self {
            scheduler: Arc::new(PoolScheduler::new(store, config.pool.clone())),
            client: GeminiClient::new(&config.upstream)?,
            translator: RequestTranslator::new(log_level, &config.upstream),
            assembler: ResponseAssembler::new(log_level),
            log_level,
        })
    }

    pub fn scheduler(&self) -> &Arc<PoolScheduler> {
        &self.scheduler
    }

    ///
    /// Serve a chat completion, streamed or not.
    ///
    /// # Arguments
    ///  * `headers` - incoming headers, checked for a caller key
    ///  * `request` - parsed OpenAI request
    ///
    /// # Returns
    ///  * complete answer or SSE stream
    ///  * translation, pool, upstream or transport errors
    pub async fn chat(&self, headers: &HeaderMap, request: ChatCompletionRequest) -> Result<ChatReply> {
        let call = self.translator.translate_chat(request)?;
        let lease = CredentialLease::acquire(headers, &self.scheduler).await?;
        info!(
            "Chat completion via {} on {} (stream: {})",
            lease.describe(),
            call.model,
            call.stream
        );

        if !call.stream {
            let result = match self
                .client
                .post_bytes(&call.model, Method::Generate, lease.api_key(), &call.body)
                .await
            {
                Ok(body) => self.assembler.assemble_bytes(&body, &call.model),
                Err(e) => Err(e),
            };
            return match result {
                Ok(completion) => {
                    let tokens = completion.usage.as_ref().map(|u| u.total_tokens);
                    self.record_success(&lease, CHAT_ENDPOINT, tokens).await;
                    Ok(ChatReply::Complete(completion))
                }
                Err(e) => {
                    self.record_failure(&lease, CHAT_ENDPOINT, &e).await;
                    Err(e)
                }
            };
        }

        let response = match self
            .client
            .post(&call.model, Method::StreamGenerate, lease.api_key(), &call.body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(&lease, CHAT_ENDPOINT, &e).await;
                return Err(e);
            }
        };

        let pipeline = StreamPipeline::new(call.model.clone(), call.include_usage, self.log_level);
        let (tx, rx) = mpsc::channel(STREAMING_CHANNEL_BUFFER);
        let scheduler = self.scheduler.clone();
        let upstream = response.bytes_stream().boxed();

        tokio::spawn(async move {
            let summary = stream::forward(upstream, pipeline, tx).await;
            debug!("Stream finished: {:?}", summary);
            if summary.upstream_failed {
                return;
            }
            if let Some(id) = lease.pool_id() {
                let record = UsageRecord::new(id, CHAT_ENDPOINT, 200)
                    .with_tokens(summary.total_tokens.unwrap_or(0) as i64);
                if let Err(e) = scheduler.record_usage(record).await {
                    warn!("Failed to record stream usage for key #{}: {}", id, e);
                }
            }
        });

        Ok(ChatReply::Stream(ReceiverStream::new(rx)))
    }

    ///
    /// Serve an embeddings call.
    pub async fn embeddings(
        &self,
        headers: &HeaderMap,
        request: EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse> {
        let call = self.translator.translate_embeddings(request)?;
        let lease = CredentialLease::acquire(headers, &self.scheduler).await?;
        debug!("Embeddings via {} on {}", lease.describe(), call.model);

        let result = async {
            let body =
                self.client.post_bytes(&call.model, Method::BatchEmbed, lease.api_key(), &call.body).await?;
            let response: BatchEmbedResponse = serde_json::from_slice(&body)?;
            Ok::<_, ProxyError>(self.assembler.map_embeddings(response, &call.model))
        }
        .await;

        self.finish(&lease, EMBEDDINGS_ENDPOINT, result).await
    }

    ///
    /// List upstream models.
    pub async fn models(&self, headers: &HeaderMap) -> Result<ModelList> {
        let lease = CredentialLease::acquire(headers, &self.scheduler).await?;

        let result = async {
            let body = self.client.list_models(lease.api_key()).await?;
            let response: ModelListResponse = serde_json::from_slice(&body)?;
            Ok::<_, ProxyError>(self.assembler.map_models(response))
        }
        .await;

        self.finish(&lease, MODELS_ENDPOINT, result).await
    }

    /* --- private methods ----------------------------------------------------------------- */

    /// Record the outcome of a call that reports no token usage.
    async fn finish<T>(&self, lease: &CredentialLease, endpoint: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.record_success(lease, endpoint, None).await,
            Err(e) => self.record_failure(lease, endpoint, e).await,
        }
        result
    }

    async fn record_success(&self, lease: &CredentialLease, endpoint: &str, tokens: Option<u64>) {
        let Some(id) = lease.pool_id() else {
            return;
        };
        let record = UsageRecord::new(id, endpoint, 200).with_tokens(tokens.unwrap_or(0) as i64);
        if let Err(e) = self.scheduler.record_usage(record).await {
            warn!("Failed to record usage for key #{}: {}", id, e);
        }
    }

    async fn record_failure(&self, lease: &CredentialLease, endpoint: &str, error: &ProxyError) {
        let Some(id) = lease.pool_id() else {
            return;
        };
        if let Err(e) = self.scheduler.record_outcome(id, endpoint, error).await {
            warn!("Failed to record failure for key #{}: {}", id, e);
        }
    }
}
