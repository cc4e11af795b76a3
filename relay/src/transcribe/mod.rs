//! Speech-to-text backends.

mod http;
#[cfg(feature = "whisper")]
mod whisper;

pub use http::WhisperServerTranscriber;
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

use crate::error::Result;
use async_trait::async_trait;
use shared_protocol::Language;

/// Turns one utterance into text.
///
/// `samples` are mono, 16kHz, normalized to [-1.0, 1.0]. Implementations
/// may take a long time; they must not block the async runtime.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[f32], language: Language) -> Result<String>;

    fn name(&self) -> &str;
}
