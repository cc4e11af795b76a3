//! Per-frame work: split, decode, transcribe, translate, answer.
//!
//! Every stage yields a [`Stage`]; only [`assemble`] decides which outbound
//! frame a combination of stage outcomes becomes.

use crate::transcribe::Transcriber;
use crate::translate::Translator;
use shared_protocol::{AudioFrame, FrameMetadata, Language, ServerMessage};
use std::sync::Arc;
use tracing::{debug, error};

/// What a client sees when translation fails but transcription worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TranslationFailure {
    /// `result` frame whose translation is `[Translation error (...)]`.
    #[default]
    Inline,
    /// `error` frame, same as any other stage failure.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Framing,
    Audio,
    Transcription,
    Translation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Error,
    InlineResult,
}

impl FailureKind {
    fn reply(self, policy: TranslationFailure) -> Reply {
        match (self, policy) {
            (FailureKind::Framing, _) => Reply::Error,
            (FailureKind::Audio, _) => Reply::Error,
            (FailureKind::Transcription, _) => Reply::Error,
            (FailureKind::Translation, TranslationFailure::Inline) => Reply::InlineResult,
            (FailureKind::Translation, TranslationFailure::Error) => Reply::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    Ok(T),
    Failed { kind: FailureKind, reason: String },
}

impl<T> Stage<T> {
    fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Stage::Failed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Picks the outbound frame. `translation` is `None` when transcription
/// never produced text to translate.
pub fn assemble(
    transcription: Stage<String>,
    translation: Option<Stage<String>>,
    policy: TranslationFailure,
) -> ServerMessage {
    let text = match transcription {
        Stage::Ok(text) => text,
        Stage::Failed { reason, .. } => {
            return ServerMessage::error(format!("Error processing audio: {reason}"));
        }
    };
    match translation {
        Some(Stage::Ok(translation)) => ServerMessage::Result {
            transcription: text,
            translation,
        },
        Some(Stage::Failed { kind, reason }) => match kind.reply(policy) {
            Reply::InlineResult => ServerMessage::Result {
                transcription: text,
                translation: format!("[{reason}]"),
            },
            Reply::Error => ServerMessage::error(reason),
        },
        None => ServerMessage::error("Error processing audio: nothing to translate"),
    }
}

pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    on_translation_failure: TranslationFailure,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        on_translation_failure: TranslationFailure,
    ) -> Self {
        Self {
            transcriber,
            translator,
            on_translation_failure,
        }
    }

    /// Exactly one reply per binary frame.
    pub async fn process(&self, frame: &[u8]) -> ServerMessage {
        let (metadata, transcription) = match self.transcribe_stage(frame).await {
            Stage::Ok((metadata, text)) => (metadata, text),
            Stage::Failed { kind, reason } => {
                return assemble(Stage::Failed { kind, reason }, None, self.on_translation_failure);
            }
        };
        let translation = self
            .translate_stage(&transcription, metadata.from_code, metadata.to_code)
            .await;
        assemble(
            Stage::Ok(transcription),
            Some(translation),
            self.on_translation_failure,
        )
    }

    async fn transcribe_stage(&self, frame: &[u8]) -> Stage<(FrameMetadata, String)> {
        let parsed = match AudioFrame::parse(frame) {
            Ok(parsed) => parsed,
            Err(e) => return Stage::failed(FailureKind::Framing, e.to_string()),
        };
        let samples = match parsed.samples() {
            Ok(samples) => samples,
            Err(e) => return Stage::failed(FailureKind::Audio, e.to_string()),
        };
        let metadata = parsed.metadata;
        debug!(
            "received {} samples, {} -> {}",
            samples.len(),
            metadata.from_code,
            metadata.to_code
        );

        match self
            .transcriber
            .transcribe(&samples, metadata.from_code)
            .await
        {
            Ok(text) => {
                debug!("Transcription result: {}", text);
                Stage::Ok((metadata, text))
            }
            Err(e) => Stage::failed(FailureKind::Transcription, e.to_string()),
        }
    }

    async fn translate_stage(&self, text: &str, from: Language, to: Language) -> Stage<String> {
        if from == to {
            return Stage::Ok(text.to_string()); // identity, no backend call
        }
        if text.trim().is_empty() {
            return Stage::Ok(String::new()); // silence
        }
        let failed = |reason: String| {
            let reason = format!("Translation error ({from} to {to}): {reason}");
            error!("{}", reason);
            Stage::failed(FailureKind::Translation, reason)
        };
        match self.translator.translate(text, from, to).await {
            Ok(translated) if translated.trim().is_empty() || translated == text => {
                failed("translation returned no new text".to_string())
            }
            Ok(translated) => {
                debug!("Translation result: {}", translated);
                Stage::Ok(translated)
            }
            Err(e) => failed(e.to_string()),
        }
    }
}
