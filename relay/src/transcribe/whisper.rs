use super::Transcriber;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use shared_protocol::{Language, SAMPLE_RATE};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// In-process whisper.cpp. The model is loaded once and shared; every call
/// gets its own decoder state so sessions can transcribe in parallel.
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    sampling_strategy: SamplingStrategy,
}

fn whisper_err(e: impl std::fmt::Display) -> RelayError {
    RelayError::Transcription {
        message: e.to_string(),
    }
}

impl WhisperTranscriber {
    pub fn load(model: &Path, beam_size: Option<i32>) -> Result<Self> {
        info!("Loading whisper model: {}", model.display());
        let model = model
            .to_str()
            .ok_or_else(|| whisper_err("model path is not valid UTF-8"))?;

        let mut params = WhisperContextParameters::default();
        params.flash_attn(true);
        #[cfg(not(feature = "vulkan"))]
        info!("Running on CPU");
        #[cfg(feature = "vulkan")]
        {
            info!("Running with GPU acceleration (Vulkan)");
            params.use_gpu(true);
        }
        let ctx = WhisperContext::new_with_params(model, params).map_err(whisper_err)?;

        let sampling_strategy = match beam_size {
            Some(beam_size) => {
                info!("Using beam search with beam_size={}", beam_size);
                SamplingStrategy::BeamSearch {
                    beam_size,
                    patience: -1.0,
                }
            }
            None => SamplingStrategy::Greedy { best_of: 1 },
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            sampling_strategy,
        })
    }
}

fn run_whisper(
    ctx: &WhisperContext,
    sampling_strategy: SamplingStrategy,
    samples: &[f32],
    language: Language,
) -> Result<String> {
    let mut state = ctx.create_state().map_err(whisper_err)?;

    let mut params = FullParams::new(sampling_strategy);
    params.set_language(Some(language.code()));
    params.set_suppress_nst(true);
    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);

    let start = Instant::now();
    state.full(params, samples).map_err(whisper_err)?;
    let duration = start.elapsed().as_secs_f64();

    let audio_duration = samples.len() as f64 / SAMPLE_RATE as f64;
    info!(
        "transcribing {:.2}s of {} audio took {:.2}s at {:.2}x",
        audio_duration,
        language.name(),
        duration,
        audio_duration / duration
    );

    let mut text = String::new();
    for i in 0..state.full_n_segments() {
        let Some(segment) = state.get_segment(i) else {
            continue;
        };
        text.push_str(&segment.to_str_lossy().map_err(whisper_err)?);
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, samples: &[f32], language: Language) -> Result<String> {
        let ctx = self.ctx.clone();
        let strategy = self.sampling_strategy.clone();
        let samples = samples.to_vec();
        tokio::task::spawn_blocking(move || run_whisper(&ctx, strategy, &samples, language))
            .await
            .map_err(whisper_err)?
    }

    fn name(&self) -> &str {
        "whisper"
    }
}
