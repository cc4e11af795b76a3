use super::Transcriber;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use shared_protocol::{Language, SAMPLE_RATE};
use std::io::Cursor;
use tracing::debug;

/// Client for a whisper.cpp `server` instance (`POST /inference`).
pub struct WhisperServerTranscriber {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct InferenceResponse {
    text: Option<String>,
    error: Option<String>,
}

impl WhisperServerTranscriber {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/inference", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }
}

fn transcription_err(message: impl Into<String>) -> RelayError {
    RelayError::Transcription {
        message: message.into(),
    }
}

/// 16-bit mono WAV at the protocol sample rate.
pub(crate) fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| transcription_err(format!("cannot encode audio: {e}")))?;
        for &sample in samples {
            let pcm = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| transcription_err(format!("cannot encode audio: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| transcription_err(format!("cannot encode audio: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[async_trait]
impl Transcriber for WhisperServerTranscriber {
    async fn transcribe(&self, samples: &[f32], language: Language) -> Result<String> {
        let wav = encode_wav(samples)?;
        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("language", language.code())
            .text("response_format", "json")
            .text("temperature", "0.0");

        debug!("posting {} samples to {}", samples.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transcription_err(format!("whisper server unreachable: {e}")))?;
        let status = response.status();
        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| transcription_err(format!("unexpected whisper server reply: {e}")))?;

        match (status.is_success(), body.text, body.error) {
            (_, _, Some(error)) => Err(transcription_err(error)),
            (true, Some(text), None) => Ok(text.trim().to_string()),
            (true, None, None) => Err(transcription_err("whisper server returned no text")),
            (false, _, None) => Err(transcription_err(format!("whisper server returned {status}"))),
        }
    }

    fn name(&self) -> &str {
        "whisper-server"
    }
}
