//!
//! Format conversion between the OpenAI and Gemini APIs.
//!
//! Requests travel OpenAI to Gemini, answers travel back. Each direction
//! lives in its own module; the wire types of both sides are kept apart
//! from the conversion logic.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod gemini;
pub mod gemini_to_openai;
pub mod openai;
pub mod openai_to_gemini;

/* --- uses ------------------------------------------------------------------------------------ */

use rand::Rng;
use rand::distributions::Alphanumeric;

pub use gemini_to_openai::ResponseAssembler;
pub use openai_to_gemini::{ChatCall, EmbeddingsCall, RequestTranslator};

/* --- constants ------------------------------------------------------------------------------ */

/** prefix of tool-call ids minted by the gateway */
pub const SYNTHETIC_CALL_PREFIX: &str = "call_";

/* --- start of code -------------------------------------------------------------------------- */

/// Fresh `chatcmpl-` identifier for a completion or stream.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", random_alphanumeric(29))
}

/// Fresh synthetic tool-call identifier.
pub fn tool_call_id() -> String {
    format!("{}{}", SYNTHETIC_CALL_PREFIX, random_alphanumeric(24))
}

/// Drop the `models/` resource prefix from a model name.
pub fn strip_model_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/* --- tests ------------------------------------------------------------------------------- */
