//! Navigation wire protocol.
//!
//! A navigation response is a sequence of newline-delimited JSON frames:
//! loader and error frames in chain order, merged head metadata, the
//! query-cache frame, `r` when the client may render, deferred chunks in
//! resolution order, and a terminal `d`. The codec is stateless per line;
//! `emit` owns the ordering.

pub mod emit;
pub mod frame;

pub use emit::{eager_frames, settle_remaining, stream_response, sync_response, take_streaming};
pub use frame::{decode_line, encode_line, DecodeError, ErrorBody, Frame};
