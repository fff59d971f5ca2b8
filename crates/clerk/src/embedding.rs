use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "onnx")]
use ort::{
  execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch},
  session::{builder::GraphOptimizationLevel, Session, SessionOutputs},
  value::Tensor,
};

use crate::config::Config;
use crate::error::ClerkError;

/// Texts per inference call
const BATCH_SIZE: usize = 32;
/// Token limit of the MiniLM sentence encoder
const MAX_SEQUENCE_LENGTH: usize = 256;

const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILES: [&str; 2] = ["onnx/model.onnx", "model.onnx"];

/// Sentence embedding model. Vectors are unit length so that inner product
/// equals cosine similarity.
pub trait EmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

  fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
    self
      .compute_embeddings(&[text.to_string()])?
      .pop()
      .ok_or_else(|| ClerkError::embedding("model returned no vector for the query").into())
  }
}

/// Deterministic bag-of-words embedder for tests: each lower-cased word is
/// hashed into one of `dimension` buckets.
pub struct MockEmbeddingModel {
  pub dimension: usize,
  pub fail_on_texts: Vec<String>,
}

impl MockEmbeddingModel {
  pub fn new() -> Self {
    Self { dimension: 64, fail_on_texts: vec![] }
  }
}

impl Default for MockEmbeddingModel {
  fn default() -> Self {
    Self::new()
  }
}

impl EmbeddingModel for MockEmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    for text in texts {
      if self.fail_on_texts.contains(text) {
        return Err(anyhow!("Mock failure for text: {}", text));
      }
    }

    Ok(texts.iter().map(|text| self.bag_of_words(text)).collect())
  }
}

impl MockEmbeddingModel {
  fn bag_of_words(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; self.dimension];
    for word in text.split_whitespace() {
      let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
      if word.is_empty() {
        continue;
      }
      let bucket = word.bytes().fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
      vector[bucket as usize % self.dimension] += 1.0;
    }
    normalize_vector(vector)
  }
}

/// Scale to unit length; zero vectors are returned unchanged
pub fn normalize_vector(vector: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if magnitude > f32::EPSILON {
    vector.into_iter().map(|x| x / magnitude).collect()
  } else {
    vector
  }
}

/// Average the token vectors of each sequence, counting only positions whose
/// attention mask is set. `data` is `[batch, seq_len, hidden]` row-major.
pub fn mean_pool(data: &[f32], mask: &[i64], batch: usize, seq_len: usize, hidden: usize) -> Vec<Vec<f32>> {
  (0..batch)
    .map(|b| {
      let mut pooled = vec![0.0f32; hidden];
      let mut count = 0.0f32;
      for t in 0..seq_len {
        if mask[b * seq_len + t] == 0 {
          continue;
        }
        count += 1.0;
        let start = (b * seq_len + t) * hidden;
        for (i, &value) in data[start..start + hidden].iter().enumerate() {
          pooled[i] += value;
        }
      }
      let count = count.max(1e-9);
      pooled.iter_mut().for_each(|v| *v /= count);
      pooled
    })
    .collect()
}

/// On-disk files of the sentence encoder
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingFiles {
  pub tokenizer: PathBuf,
  pub model: PathBuf,
}

/// Find the encoder locally: `embedding_dir` when configured, otherwise the
/// Hugging Face cache under `cache_dir`. Nothing is downloaded.
pub fn resolve_embedding_files(config: &Config) -> Result<EmbeddingFiles, ClerkError> {
  match &config.embedding_dir {
    Some(dir) => files_in_dir(dir),
    None => files_in_cache(config),
  }
}

fn files_in_dir(dir: &Path) -> Result<EmbeddingFiles, ClerkError> {
  let tokenizer = dir.join(TOKENIZER_FILE);
  if !tokenizer.is_file() {
    return Err(ClerkError::model_load(dir, format!("{TOKENIZER_FILE} not found")));
  }

  let model = MODEL_FILES
    .iter()
    .map(|name| dir.join(name))
    .find(|path| path.is_file())
    .ok_or_else(|| ClerkError::model_load(dir, "no ONNX model (onnx/model.onnx or model.onnx)"))?;

  Ok(EmbeddingFiles { tokenizer, model })
}

#[cfg(feature = "onnx")]
fn files_in_cache(config: &Config) -> Result<EmbeddingFiles, ClerkError> {
  let cache = hf_hub::Cache::new(config.cache_dir.clone());
  let repo = cache.model(config.embedding_model.clone());
  let missing = |what: &str| {
    ClerkError::model_load(
      &config.cache_dir,
      format!("{} is not cached for {} (offline mode)", what, config.embedding_model),
    )
  };

  let tokenizer = repo.get(TOKENIZER_FILE).ok_or_else(|| missing(TOKENIZER_FILE))?;
  let model = MODEL_FILES.iter().find_map(|name| repo.get(name)).ok_or_else(|| missing("onnx/model.onnx"))?;
  Ok(EmbeddingFiles { tokenizer, model })
}

#[cfg(not(feature = "onnx"))]
fn files_in_cache(config: &Config) -> Result<EmbeddingFiles, ClerkError> {
  Err(ClerkError::model_load(&config.cache_dir, "built without the onnx feature"))
}

#[cfg(feature = "onnx")]
pub struct OnnxEmbeddingModel {
  session: Session,
  tokenizer: tokenizers::Tokenizer,
}

// Model initialization
#[cfg(feature = "onnx")]
#[cfg(not(tarpaulin_include))]
impl OnnxEmbeddingModel {
  pub fn load(config: &Config) -> Result<Self> {
    let files = resolve_embedding_files(config)?;
    herald::verbose!(&format!("Loading embedding model from {}", files.model.display()));

    let tokenizer = load_tokenizer(&files.tokenizer)?;
    let session = cpu_session(&files.model)?;
    Ok(Self { session, tokenizer })
  }
}

#[cfg(feature = "onnx")]
fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer, ClerkError> {
  let mut tokenizer =
    tokenizers::Tokenizer::from_file(path).map_err(|e| ClerkError::model_load(path, e.to_string()))?;

  tokenizer
    .with_truncation(Some(tokenizers::TruncationParams {
      max_length: MAX_SEQUENCE_LENGTH,
      ..Default::default()
    }))
    .map_err(|e| ClerkError::tokenizer(e.to_string()))?;
  tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

  Ok(tokenizer)
}

/// ONNX session pinned to the CPU execution provider
#[cfg(feature = "onnx")]
pub(crate) fn cpu_session(model_path: &Path) -> Result<Session, ClerkError> {
  let providers: Vec<ExecutionProviderDispatch> = vec![CPUExecutionProvider::default().into()];

  Session::builder()
    .map_err(load_error(model_path))?
    .with_execution_providers(providers)
    .map_err(load_error(model_path))?
    .with_optimization_level(GraphOptimizationLevel::Level1)
    .map_err(load_error(model_path))?
    .commit_from_file(model_path)
    .map_err(load_error(model_path))
}

#[cfg(feature = "onnx")]
fn load_error<E: std::fmt::Display>(path: &Path) -> impl Fn(E) -> ClerkError + '_ {
  move |e| ClerkError::model_load(path, e.to_string())
}

#[cfg(feature = "onnx")]
impl EmbeddingModel for OnnxEmbeddingModel {
  fn compute_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(BATCH_SIZE) {
      embeddings.extend(self.embed_batch(batch)?);
    }
    Ok(embeddings)
  }
}

#[cfg(feature = "onnx")]
impl OnnxEmbeddingModel {
  fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(vec![]);
    }

    let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
    let encodings = self
      .tokenizer
      .encode_batch(text_refs, true)
      .map_err(|e| ClerkError::tokenizer(e.to_string()))?;

    let batch = encodings.len();
    let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    let mut type_ids = Vec::with_capacity(batch * seq_len);
    for encoding in &encodings {
      ids.extend(encoding.get_ids().iter().map(|&x| x as i64));
      mask.extend(encoding.get_attention_mask().iter().map(|&x| x as i64));
      type_ids.extend(encoding.get_type_ids().iter().map(|&x| x as i64));
    }

    let attention = mask.clone();
    let outputs = self.session.run(ort::inputs![
      "input_ids" => Tensor::from_array(([batch, seq_len], ids.into_boxed_slice()))?,
      "attention_mask" => Tensor::from_array(([batch, seq_len], mask.into_boxed_slice()))?,
      "token_type_ids" => Tensor::from_array(([batch, seq_len], type_ids.into_boxed_slice()))?
    ])?;

    let hidden_states = last_hidden_state(&outputs)?;
    let (shape, data) = hidden_states.try_extract_tensor::<f32>()?;
    let hidden = *shape.last().ok_or_else(|| ClerkError::embedding("output tensor has no shape"))? as usize;

    Ok(mean_pool(data, &attention, batch, seq_len, hidden).into_iter().map(normalize_vector).collect())
  }
}

#[cfg(feature = "onnx")]
fn last_hidden_state<'a>(outputs: &'a SessionOutputs<'_>) -> Result<&'a ort::value::DynValue> {
  outputs.get("last_hidden_state").or_else(|| outputs.get("token_embeddings")).ok_or_else(|| {
    anyhow!("No hidden state output - available outputs: {:?}", outputs.keys().collect::<Vec<_>>())
  })
}
