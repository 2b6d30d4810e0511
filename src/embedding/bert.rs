//! Sentence-transformer embeddings using Candle
//!
//! Runs a BERT encoder (default `all-MiniLM-L6-v2`) with mean pooling over
//! the attention mask followed by L2 normalisation.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as ModelConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::PathBuf;
use tokenizers::Tokenizer;

use super::{EmbeddingError, EmbeddingProvider, EMBEDDING_DIM};

/// BERT embedder configuration
#[derive(Debug, Clone)]
pub struct BertConfig {
    /// HuggingFace model ID
    pub model_id: String,

    /// Output dimension of the pooled embedding
    pub embedding_dim: usize,

    /// Maximum sequence length
    pub max_seq_length: usize,

    /// Use GPU if available
    pub use_gpu: bool,
}

impl Default for BertConfig {
    fn default() -> Self {
        Self {
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dim: EMBEDDING_DIM,
            max_seq_length: 256,
            use_gpu: false,
        }
    }
}

fn model_err(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Model(e.to_string())
}

/// BERT sentence embedder
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: BertConfig,
}

impl BertEmbedder {
    /// Download the model from the HuggingFace Hub and load it
    pub fn from_pretrained(config: BertConfig) -> Result<Self, EmbeddingError> {
        let device = if config.use_gpu {
            Device::cuda_if_available(0).unwrap_or(Device::Cpu)
        } else {
            Device::Cpu
        };

        tracing::info!(model = %config.model_id, gpu = !device.is_cpu(), "Loading embedding model");

        let api = Api::new().map_err(model_err)?;
        let repo = api.repo(Repo::new(config.model_id.clone(), RepoType::Model));

        let tokenizer_path = repo.get("tokenizer.json").map_err(model_err)?;
        let config_path = repo.get("config.json").map_err(model_err)?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(model_err)?;

        Self::from_files(tokenizer_path, config_path, weights_path, config, device)
    }

    /// Load the model from local files
    pub fn from_files(
        tokenizer_path: PathBuf,
        config_path: PathBuf,
        weights_path: PathBuf,
        config: BertConfig,
        device: Device,
    ) -> Result<Self, EmbeddingError> {
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_err)?;

        let raw = std::fs::read_to_string(&config_path).map_err(model_err)?;
        let model_config: ModelConfig = serde_json::from_str(&raw).map_err(model_err)?;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            // SAFETY: the weights file is not modified while mapped
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                    .map_err(model_err)?
            }
        } else {
            VarBuilder::from_pth(&weights_path, DType::F32, &device).map_err(model_err)?
        };

        let model = BertModel::load(vb, &model_config).map_err(model_err)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            config,
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| EmbeddingError::Tokenization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.config.max_seq_length)
            .max(1);

        let batch_size = encodings.len();
        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let seq_len = encoding.get_ids().len().min(max_len);
            input_ids.extend(encoding.get_ids().iter().take(seq_len).map(|&x| i64::from(x)));
            attention_mask.extend(encoding.get_attention_mask().iter().take(seq_len).map(|&x| i64::from(x)));
            token_type_ids.extend(encoding.get_type_ids().iter().take(seq_len).map(|&x| i64::from(x)));

            let padding = max_len - seq_len;
            input_ids.extend(std::iter::repeat(0i64).take(padding));
            attention_mask.extend(std::iter::repeat(0i64).take(padding));
            token_type_ids.extend(std::iter::repeat(0i64).take(padding));
        }

        let shape = (batch_size, max_len);
        let input_ids = Tensor::from_vec(input_ids, shape, &self.device).map_err(model_err)?;
        let attention_mask = Tensor::from_vec(attention_mask, shape, &self.device).map_err(model_err)?;
        let token_type_ids = Tensor::from_vec(token_type_ids, shape, &self.device).map_err(model_err)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(model_err)?;

        let pooled = mean_pooling(&hidden, &attention_mask).map_err(model_err)?;
        let normalized = l2_normalize(&pooled).map_err(model_err)?;
        normalized.to_vec2::<f32>().map_err(model_err)
    }
}

/// Mean over the sequence dimension, ignoring padding
fn mean_pooling(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.unsqueeze(2)?.to_dtype(DType::F32)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let lengths = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&lengths)
}

fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    embeddings.broadcast_div(&norms)
}

impl EmbeddingProvider for BertEmbedder {
    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_chunk(texts)
    }
}
