//! Mode-aware transcript summarization on a local Qwen 2.5 instruct model.
//!
//! Weights come from the Hugging Face hub (cached locally by `hf-hub`) and run
//! through candle on CPU (F32) or Metal (F16). Generation mutates the model's
//! KV cache, so the model lives behind a `Mutex` and every request clears the
//! cache before prefill.
//!
//! Generation is best-effort: when sampling fails mid-request the summarizer
//! falls back to a simple extractive summary instead of failing the request.

mod chat;
mod confidence;
mod extractive;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::qwen2::{Config as QwenConfig, ModelForCausalLM};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Serialize;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::modes::RecordingMode;
use crate::prompt::{TokenCounter, build_prompt};

use confidence::estimate_confidence;
use extractive::extractive_summary;

/// Default generation model.
pub const DEFAULT_MODEL_ID: &str = "Qwen/Qwen2.5-1.5B-Instruct";

const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.9;
const SAMPLING_SEED: u64 = 299_792_458;

/// Result of one summarization request.
#[derive(Debug, Clone, Serialize)]
pub struct SummarizationResult {
    pub summary: String,
    pub mode: RecordingMode,
    pub tokens_used: usize,
    pub confidence: f32,
}

impl SummarizationResult {
    /// The canned result for a transcript with no content.
    pub fn empty(mode: RecordingMode) -> Self {
        Self {
            summary: "No transcript content to summarize.".to_owned(),
            mode,
            tokens_used: 0,
            confidence: 0.0,
        }
    }
}

/// A loaded generation model plus its tokenizer.
pub struct Summarizer {
    model: Mutex<ModelForCausalLM>,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    eos_ids: Vec<u32>,
    chatml: bool,
}

impl Summarizer {
    /// Download (or reuse the local cache of) `model_id` and build the model.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::new_metal(0).unwrap_or(Device::Cpu);
        let dtype = if device.is_cpu() {
            DType::F32
        } else {
            DType::F16
        };

        info!(model = model_id, device = ?device, "loading summarization model");

        load_model(model_id, &device, dtype)
            .map_err(|e| Error::ModelUnavailable(format!("{model_id}: {e:#}")))
    }

    /// The hub id this summarizer was loaded from.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Summarize a transcript according to the mode's profile.
    pub fn summarize(
        &self,
        transcript: &str,
        mode: RecordingMode,
        custom_prompt: Option<&str>,
    ) -> Result<SummarizationResult> {
        if transcript.trim().is_empty() {
            return Ok(SummarizationResult::empty(mode));
        }

        let counter = TokenCounter::new(Some(&self.tokenizer));
        let prompt = build_prompt(transcript, mode, custom_prompt, &counter);

        let rendered = if self.chatml {
            chat::render_chatml(&prompt)
        } else {
            chat::render_plain(&prompt)
        };

        let token_limit = mode.config().token_limit;

        let summary = match self
            .generate(&rendered, token_limit)
            .map_err(|e| Error::Generation(format!("{e:#}")))
        {
            Ok(text) => text,
            Err(err) => {
                warn!(mode = %mode, error = %err, "generation failed; using extractive fallback");
                extractive_summary(transcript)
            }
        };
        let summary = summary.trim().to_owned();

        let confidence = estimate_confidence(&summary);
        let tokens_used = counter.count(&summary);

        Ok(SummarizationResult {
            summary,
            mode,
            tokens_used,
            confidence,
        })
    }

    fn generate(&self, rendered_prompt: &str, max_new_tokens: usize) -> anyhow::Result<String> {
        let encoding = self
            .tokenizer
            .encode(rendered_prompt, true)
            .map_err(|e| anyhow!("tokenize prompt: {e}"))?;
        let prompt_ids: Vec<u32> = encoding.get_ids().to_vec();
        if prompt_ids.is_empty() {
            anyhow::bail!("prompt tokenized to zero tokens");
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("summarizer model lock poisoned"))?;
        model.clear_kv_cache();

        let mut processor = LogitsProcessor::from_sampling(
            SAMPLING_SEED,
            Sampling::TopP {
                p: TOP_P,
                temperature: TEMPERATURE,
            },
        );

        let mut tokens = prompt_ids;
        let mut generated: Vec<u32> = Vec::new();

        for step in 0..max_new_tokens {
            let (context, offset) = if step == 0 {
                (&tokens[..], 0)
            } else {
                (&tokens[tokens.len() - 1..], tokens.len() - 1)
            };

            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = model
                .forward(&input, offset)
                .context("model forward pass failed")?;
            let logits = logits.squeeze(0)?.squeeze(0)?.to_dtype(DType::F32)?;

            let next = processor.sample(&logits)?;
            tokens.push(next);

            if self.eos_ids.contains(&next) {
                break;
            }
            generated.push(next);
        }

        // Decode only the generated span, never the prompt.
        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow!("decode generated tokens: {e}"))
    }
}

fn load_model(model_id: &str, device: &Device, dtype: DType) -> anyhow::Result<Summarizer> {
    let api = Api::new().context("hf-hub init failed")?;
    let repo = api.repo(Repo::new(model_id.to_owned(), RepoType::Model));

    let config_path = repo.get("config.json").context("config.json")?;
    let tokenizer_path = repo.get("tokenizer.json").context("tokenizer.json")?;
    let weight_paths = fetch_weights(&repo)?;

    let config: QwenConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
        .context("parse config.json")?;

    let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| anyhow!("tokenizer: {e}"))?;

    // SAFETY: safetensors files are memory-mapped read-only from the local
    // hf-hub cache.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&weight_paths, dtype, device)
            .context("load weights")?
    };

    let model = ModelForCausalLM::new(&config, vb).context("model init")?;

    let eos_ids: Vec<u32> = ["<|im_end|>", "<|endoftext|>"]
        .iter()
        .filter_map(|t| tokenizer.token_to_id(t))
        .collect();
    let chatml = tokenizer.token_to_id("<|im_start|>").is_some();

    Ok(Summarizer {
        model: Mutex::new(model),
        tokenizer,
        device: device.clone(),
        model_id: model_id.to_owned(),
        eos_ids,
        chatml,
    })
}

fn fetch_weights(repo: &ApiRepo) -> anyhow::Result<Vec<PathBuf>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return Ok(vec![path]);
    }

    // Sharded layout: the index maps tensor names to shard filenames.
    let index_path = repo
        .get("model.safetensors.index.json")
        .context("model.safetensors.index.json")?;
    let index_str = std::fs::read_to_string(&index_path).context("read index.json")?;
    let shard_names = parse_shard_names(&index_str)?;

    let mut paths = Vec::with_capacity(shard_names.len());
    for name in &shard_names {
        paths.push(repo.get(name).with_context(|| format!("shard {name}"))?);
    }
    Ok(paths)
}

fn parse_shard_names(index_json: &str) -> anyhow::Result<Vec<String>> {
    let index: serde_json::Value =
        serde_json::from_str(index_json).context("parse index.json")?;

    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("index.json missing weight_map object"))?;

    let names: std::collections::BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::to_owned)
        .collect();

    if names.is_empty() {
        anyhow::bail!("index.json weight_map contains no shard filenames");
    }

    Ok(names.into_iter().collect())
}
