//! Live transcription and translation relay.
//!
//! Clients open a WebSocket, receive the installed language pairs, then send
//! binary frames of `<json metadata>\n<i16 LE pcm>`; each frame is answered
//! with one `result` or `error` message.

pub mod catalog;
pub mod config;
pub mod error;
pub mod origin;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod session;
pub mod tls;
pub mod transcribe;
pub mod translate;

pub use error::{RelayError, Result};
