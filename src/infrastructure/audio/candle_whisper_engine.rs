use std::sync::Mutex;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::application::ports::{TranscriptionEngine, TranscriptionError};
use crate::domain::{
    AudioBuffer, TaskKind, Transcript, TranscriptSegment, TranscriptionOptions,
    normalize_segments,
};
use crate::presentation::config::DevicePreference;

use super::model_lock::lock_model;
use super::voice_activity::{DEFAULT_SILENCE_THRESHOLD, is_silent};

const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";
const SECONDS_PER_TIMESTAMP: f64 = 0.02;
/// First timestamp may not exceed one second into the window.
const MAX_INITIAL_TIMESTAMP: usize = 50;

/// Every language token in the multilingual Whisper vocabularies, in token order.
/// `yue` only exists from large-v3 on; missing tokens are skipped at detection.
const WHISPER_LANGUAGES: [&str; 100] = [
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su", "yue",
];

struct SpecialTokens {
    sot: u32,
    eot: u32,
    transcribe: u32,
    translate: u32,
    timestamp_begin: u32,
}

/// Local Whisper inference with timestamped greedy decoding.
///
/// Audio is processed in 30 second windows; silent windows are skipped.
/// The model sits behind a mutex, so calls on one instance are serialized.
pub struct CandleWhisperEngine {
    model: Mutex<m::model::Whisper>,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    mel_filters: Vec<f32>,
    tokens: SpecialTokens,
    multilingual: bool,
    model_id: String,
    device_label: String,
}

impl CandleWhisperEngine {
    pub fn new(model_id: &str, preference: DevicePreference) -> Result<Self, TranscriptionError> {
        let device = Self::select_device(preference);
        let dtype = Self::select_dtype(&device);

        tracing::info!(
            device = ?device,
            dtype = ?dtype,
            model = model_id,
            "Initializing Candle Whisper transcription engine"
        );

        let api = Api::new().map_err(|e| TranscriptionError::ModelLoadFailed(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo.get("model.safetensors").map_err(|e| {
            TranscriptionError::ModelLoadFailed(format!("model.safetensors: {}", e))
        })?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("read config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_contents)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("parse config: {}", e)))?;

        let mel_file = match config.num_mel_bins {
            80 => "melfilters.bytes",
            128 => "melfilters128.bytes",
            n => {
                return Err(TranscriptionError::ModelLoadFailed(format!(
                    "unsupported mel bin count: {}",
                    n
                )));
            }
        };
        let mel_repo = api.repo(Repo::new(MEL_FILTERS_REPO.to_string(), RepoType::Model));
        let mel_bytes_path = mel_repo
            .get(mel_file)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("{}: {}", mel_file, e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("tokenizer: {}", e)))?;

        let mel_bytes = std::fs::read(&mel_bytes_path)
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("mel filters: {}", e)))?;
        let mel_filters = read_mel_filters(&mel_bytes, &config)?;

        let tokens = SpecialTokens {
            sot: token_id(&tokenizer, m::SOT_TOKEN)?,
            eot: token_id(&tokenizer, m::EOT_TOKEN)?,
            transcribe: token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?,
            translate: token_id(&tokenizer, m::TRANSLATE_TOKEN)?,
            timestamp_begin: token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)? + 1,
        };
        let multilingual = !model_id.ends_with(".en") && tokenizer.token_to_id("<|en|>").is_some();

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, &device)
                .map_err(|e| TranscriptionError::ModelLoadFailed(format!("weights: {}", e)))?
        };

        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| TranscriptionError::ModelLoadFailed(format!("model: {}", e)))?;

        let device_label = if device.is_cuda() {
            "cuda"
        } else if device.is_metal() {
            "metal"
        } else {
            "cpu"
        };

        tracing::info!(multilingual, "Candle Whisper engine loaded successfully");

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            config,
            device,
            dtype,
            mel_filters,
            tokens,
            multilingual,
            model_id: model_id.to_string(),
            device_label: device_label.to_string(),
        })
    }

    pub fn select_device(preference: DevicePreference) -> Device {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto => {
                if candle_core::utils::cuda_is_available() {
                    if let Ok(device) = Device::new_cuda(0) {
                        return device;
                    }
                }
                if candle_core::utils::metal_is_available() {
                    if let Ok(device) = Device::new_metal(0) {
                        return device;
                    }
                }
                Device::Cpu
            }
        }
    }

    pub fn select_dtype(device: &Device) -> DType {
        if device.is_cpu() { DType::F32 } else { DType::F16 }
    }

    fn mel_for_window(&self, window: &[f32]) -> Result<Tensor, TranscriptionError> {
        let mut samples = window.to_vec();
        samples.resize(m::N_SAMPLES, 0.0);

        let mel_data = m::audio::pcm_to_mel(&self.config, &samples, &self.mel_filters);
        let n_mel = self.config.num_mel_bins;
        let n_frames = mel_data.len() / n_mel;

        let mel = Tensor::from_vec(mel_data, (1, n_mel, n_frames), &self.device)
            .map_err(inference("mel tensor"))?;
        let mel = if n_frames > m::N_FRAMES {
            mel.narrow(2, 0, m::N_FRAMES).map_err(inference("mel narrow"))?
        } else {
            mel
        };
        mel.to_dtype(self.dtype).map_err(inference("mel dtype"))
    }

    fn detect_language(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
    ) -> Result<String, TranscriptionError> {
        let tokens = Tensor::new(&[self.tokens.sot], &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(inference("language tokens"))?;
        let ys = model
            .decoder
            .forward(&tokens, features, true)
            .map_err(inference("language decoder"))?;
        let logits = last_logits(model, &ys)?;

        let detected = WHISPER_LANGUAGES
            .iter()
            .filter_map(|lang| {
                self.tokenizer
                    .token_to_id(&format!("<|{}|>", lang))
                    .and_then(|id| logits.get(id as usize).map(|&l| (*lang, l)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(lang, _)| lang.to_string())
            .ok_or_else(|| {
                TranscriptionError::InferenceFailed("no language tokens in vocabulary".to_string())
            })?;

        tracing::debug!(language = %detected, "Detected spoken language");
        Ok(detected)
    }

    fn decode_window(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        language: Option<&str>,
        task: TaskKind,
    ) -> Result<Vec<(u32, f32)>, TranscriptionError> {
        let mut tokens = vec![self.tokens.sot];
        if self.multilingual {
            if let Some(lang) = language {
                tokens.push(
                    self.tokenizer
                        .token_to_id(&format!("<|{}|>", lang))
                        .ok_or_else(|| TranscriptionError::UnsupportedLanguage(lang.to_string()))?,
                );
            }
            tokens.push(match task {
                TaskKind::Transcribe => self.tokens.transcribe,
                TaskKind::Translate => self.tokens.translate,
            });
        }

        let mut generated: Vec<(u32, f32)> = Vec::new();
        let max_new_tokens = self.config.max_target_positions / 2;

        for step in 0..max_new_tokens {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference("tokens"))?;
            let ys = model
                .decoder
                .forward(&tokens_t, features, step == 0)
                .map_err(inference("decoder"))?;

            let mut logits = last_logits(model, &ys)?;
            self.apply_timestamp_rules(&mut logits, &generated);
            let log_probs = log_softmax(&logits);
            let Some((next, log_prob)) = argmax(&log_probs) else {
                break;
            };

            if next == self.tokens.eot {
                break;
            }
            tokens.push(next);
            generated.push((next, log_prob));
        }

        model.reset_kv_cache();
        Ok(generated)
    }

    /// Whisper's timestamp constraints for greedy decoding.
    fn apply_timestamp_rules(&self, logits: &mut [f32], generated: &[(u32, f32)]) {
        let eot = self.tokens.eot as usize;
        let ts_begin = self.tokens.timestamp_begin as usize;
        let vocab = logits.len();

        // Special tokens never appear in the output.
        suppress(logits, eot + 1..ts_begin);

        let last_was_ts = generated.last().is_some_and(|(t, _)| *t as usize >= ts_begin);
        let penultimate_was_ts =
            generated.len() < 2 || generated[generated.len() - 2].0 as usize >= ts_begin;

        if last_was_ts {
            if penultimate_was_ts {
                suppress(logits, ts_begin..vocab);
            } else {
                suppress(logits, 0..eot);
            }
        }

        if let Some(last_ts) = generated
            .iter()
            .rev()
            .map(|(t, _)| *t as usize)
            .find(|t| *t >= ts_begin)
        {
            suppress(logits, ts_begin..last_ts);
        }

        if generated.is_empty() {
            suppress(logits, 0..ts_begin);
            suppress(logits, ts_begin + MAX_INITIAL_TIMESTAMP + 1..vocab);
        }

        // Prefer a timestamp when their combined probability beats any single text token.
        let log_probs = log_softmax(logits);
        if ts_begin < vocab {
            let ts_mass = log_sum_exp(&log_probs[ts_begin..]);
            let best_text = log_probs[..ts_begin]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            if ts_mass > best_text {
                suppress(logits, 0..ts_begin);
            }
        }
    }

    fn segments_from_tokens(
        &self,
        generated: &[(u32, f32)],
        offset: f64,
        window_end: f64,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let ts_begin = self.tokens.timestamp_begin;
        let mut segments = Vec::new();
        let mut start: Option<f64> = None;
        let mut text_tokens: Vec<u32> = Vec::new();
        let mut log_probs: Vec<f32> = Vec::new();

        for &(token, log_prob) in generated {
            if token >= ts_begin {
                let at = offset + (token - ts_begin) as f64 * SECONDS_PER_TIMESTAMP;
                match start {
                    Some(s) if !text_tokens.is_empty() => {
                        segments.push(self.segment(s, at, &text_tokens, &log_probs)?);
                        text_tokens.clear();
                        log_probs.clear();
                        start = None;
                    }
                    _ => start = Some(at),
                }
            } else if token < self.tokens.eot {
                text_tokens.push(token);
                log_probs.push(log_prob);
            }
        }

        if !text_tokens.is_empty() {
            segments.push(self.segment(
                start.unwrap_or(offset),
                window_end,
                &text_tokens,
                &log_probs,
            )?);
        }

        Ok(segments)
    }

    fn segment(
        &self,
        start: f64,
        end: f64,
        text_tokens: &[u32],
        log_probs: &[f32],
    ) -> Result<TranscriptSegment, TranscriptionError> {
        let text = self
            .tokenizer
            .decode(text_tokens, true)
            .map_err(inference("detokenize"))?;
        let mean = log_probs.iter().sum::<f32>() / log_probs.len().max(1) as f32;
        Ok(TranscriptSegment::new(start, end, text.trim()).with_confidence(mean.exp()))
    }
}

impl TranscriptionEngine for CandleWhisperEngine {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn device(&self) -> &str {
        &self.device_label
    }

    fn transcribe(
        &self,
        audio: &AudioBuffer,
        options: &TranscriptionOptions,
        on_segment: &mut dyn FnMut(&TranscriptSegment),
    ) -> Result<Transcript, TranscriptionError> {
        if audio.sample_rate() != m::SAMPLE_RATE as u32 {
            return Err(TranscriptionError::InferenceFailed(format!(
                "expected {} Hz audio, got {} Hz",
                m::SAMPLE_RATE,
                audio.sample_rate()
            )));
        }

        if !self.multilingual {
            if options.task == TaskKind::Translate {
                return Err(TranscriptionError::UnsupportedTask(format!(
                    "{} is English-only and cannot translate",
                    self.model_id
                )));
            }
            if let Some(lang) = options.language.as_deref().filter(|l| *l != "en") {
                return Err(TranscriptionError::UnsupportedLanguage(format!(
                    "{} (model {} is English-only)",
                    lang, self.model_id
                )));
            }
        } else if let Some(lang) = options.language.as_deref() {
            if self.tokenizer.token_to_id(&format!("<|{}|>", lang)).is_none() {
                return Err(TranscriptionError::UnsupportedLanguage(lang.to_string()));
            }
        }

        let mut model = lock_model(&self.model, |model| model.reset_kv_cache());

        let duration = audio.duration();
        let mut language = options.language.clone();
        let mut segments: Vec<TranscriptSegment> = Vec::new();

        for (index, window) in audio.samples().chunks(m::N_SAMPLES).enumerate() {
            if is_silent(window, DEFAULT_SILENCE_THRESHOLD) {
                tracing::debug!(window = index, "Skipping silent window");
                continue;
            }

            let offset = (index * m::N_SAMPLES) as f64 / m::SAMPLE_RATE as f64;
            let window_end = (offset + window.len() as f64 / m::SAMPLE_RATE as f64).min(duration);

            let mel = self.mel_for_window(window)?;
            let features = model
                .encoder
                .forward(&mel, true)
                .map_err(inference("encoder"))?;

            if language.is_none() && self.multilingual {
                language = Some(self.detect_language(&mut model, &features)?);
            }

            tracing::debug!(window = index, offset_secs = offset, "Decoding audio window");
            let generated =
                self.decode_window(&mut model, &features, language.as_deref(), options.task)?;

            let window_segments = self.segments_from_tokens(&generated, offset, window_end)?;
            for segment in normalize_segments(window_segments, window_end) {
                on_segment(&segment);
                segments.push(segment);
            }
        }

        if !self.multilingual {
            language.get_or_insert_with(|| "en".to_string());
        }

        tracing::info!(
            segments = segments.len(),
            duration_secs = duration,
            "Audio transcription completed"
        );

        Ok(Transcript::new(segments, language))
    }
}

fn last_logits(model: &mut m::model::Whisper, ys: &Tensor) -> Result<Vec<f32>, TranscriptionError> {
    let (_, seq_len, _) = ys.dims3().map_err(inference("decoder output"))?;
    model
        .decoder
        .final_linear(&ys.i((..1, seq_len - 1..)).map_err(inference("decoder tail"))?)
        .and_then(|l| l.i(0))
        .and_then(|l| l.i(0))
        .and_then(|l| l.to_dtype(DType::F32))
        .and_then(|l| l.to_vec1::<f32>())
        .map_err(inference("logits"))
}

fn inference<E: std::fmt::Display>(stage: &'static str) -> impl Fn(E) -> TranscriptionError {
    move |e| TranscriptionError::InferenceFailed(format!("{}: {}", stage, e))
}

fn suppress(logits: &mut [f32], range: std::ops::Range<usize>) {
    let end = range.end.min(logits.len());
    let start = range.start.min(end);
    for l in &mut logits[start..end] {
        *l = f32::NEG_INFINITY;
    }
}

fn log_sum_exp(values: &[f32]) -> f32 {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f32>().ln()
}

fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let normalizer = log_sum_exp(logits);
    logits.iter().map(|&l| l - normalizer).collect()
}

fn argmax(values: &[f32]) -> Option<(u32, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, v)| (i as u32, v))
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, TranscriptionError> {
    tokenizer.token_to_id(token).ok_or_else(|| {
        TranscriptionError::ModelLoadFailed(format!("token not found: {}", token))
    })
}

fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>, TranscriptionError> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(TranscriptionError::ModelLoadFailed(format!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        )));
    }

    let filters: Vec<f32> = bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(filters)
}
