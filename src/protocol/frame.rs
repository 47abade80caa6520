//! Wire frame codec.
//!
//! # Responsibilities
//! - Define the newline-delimited JSON frames a navigation response is
//!   made of
//! - Encode one frame per line; decode single lines statelessly
//!
//! # Design Decisions
//! - The tag field `t` is one byte on the wire; serde's internal tagging
//!   keeps the enum ergonomic without hand-rolled dispatch
//! - Unknown tags decode to `None`, not an error, so older servers and
//!   newer clients can coexist
//! - Malformed JSON or a missing tag is a real decode error; silent
//!   skipping is reserved for well-formed frames we do not know

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::QueryEntry;

/// Error payload carried by `e` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One line of a navigation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Frame {
    /// Loader result for one match.
    #[serde(rename = "l")]
    Loader {
        /// Match identity string.
        id: String,
        data: Value,
        /// Preloader context snapshot the match's loader saw.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ctx: Option<Value>,
    },

    /// Late-resolved deferred value.
    #[serde(rename = "c")]
    Chunk { id: String, key: String, data: Value },

    /// Isolated failure: a whole match (no `key`) or one deferred value.
    #[serde(rename = "e")]
    Error {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        error: ErrorBody,
    },

    /// Head metadata. Without an `id` it is the merged document head.
    #[serde(rename = "h")]
    Head {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        head: Value,
    },

    /// Dehydrated query-cache entries.
    #[serde(rename = "q")]
    Query { entries: Vec<QueryEntry> },

    /// Everything eager has been sent; the client may render.
    #[serde(rename = "r")]
    Ready,

    /// Terminal frame; nothing follows.
    #[serde(rename = "d")]
    Done,
}

const KNOWN_TAGS: [&str; 7] = ["l", "c", "e", "h", "q", "r", "d"];

/// Line-level decode failures. An unknown tag is not one of these.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `t` tag")]
    MissingTag,
}

/// Encode one frame as a full line, trailing newline included.
pub fn encode_line(frame: &Frame) -> String {
    let mut line = serde_json::to_string(frame).expect("frames serialize to JSON");
    line.push('\n');
    line
}

/// Decode one line. `Ok(None)` covers blank lines and frames with a tag
/// this version does not know.
pub fn decode_line(line: &str) -> Result<Option<Frame>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)?;
    let tag = value
        .get("t")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingTag)?;
    if !KNOWN_TAGS.contains(&tag) {
        tracing::debug!(tag = %tag, "skipping frame with unknown tag");
        return Ok(None);
    }

    Ok(Some(serde_json::from_value(value)?))
}
