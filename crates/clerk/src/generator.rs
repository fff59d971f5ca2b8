//! Causal language model generation
//!
//! [`TextGenerator::generate`] returns the prompt followed by the sampled
//! continuation. The ONNX implementation reads a decoder-only export from the
//! model directory (never from the network) and decodes one token at a time,
//! reusing `past_key_values` when the export provides them. The end-of-sequence
//! token stops generation and doubles as the padding token.

use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "onnx")]
use ndarray::Array4;
#[cfg(feature = "onnx")]
use ort::{
  session::{Session, SessionOutputs},
  value::{Tensor, Value},
};
#[cfg(feature = "onnx")]
use std::collections::HashMap;
#[cfg(feature = "onnx")]
use std::time::Instant;

#[cfg(feature = "onnx")]
use crate::config::Config;
use crate::error::ClerkError;
#[cfg(feature = "onnx")]
use crate::sampling::{DecodingParams, Sampler};

const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";
const MODEL_FILES: [&str; 4] =
  ["model.onnx", "onnx/model.onnx", "decoder_model_merged.onnx", "onnx/decoder_model_merged.onnx"];

pub trait TextGenerator {
  /// Prompt followed by the generated continuation
  fn generate(&mut self, prompt: &str) -> Result<String>;
}

/// Echoes the prompt and appends a fixed continuation
pub struct MockGenerator {
  pub continuation: String,
  pub fail: bool,
  pub prompts: Vec<String>,
}

impl MockGenerator {
  pub fn new(continuation: impl Into<String>) -> Self {
    Self { continuation: continuation.into(), fail: false, prompts: vec![] }
  }
}

impl TextGenerator for MockGenerator {
  fn generate(&mut self, prompt: &str) -> Result<String> {
    self.prompts.push(prompt.to_string());
    if self.fail {
      return Err(ClerkError::generation("mock generator failure").into());
    }
    Ok(format!("{prompt}{}", self.continuation))
  }
}

/// Architecture facts needed to drive the decoder, read from `config.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
  pub num_hidden_layers: usize,
  pub num_attention_heads: usize,
  #[serde(default)]
  pub num_key_value_heads: Option<usize>,
  pub hidden_size: usize,
  #[serde(default)]
  pub head_dim: Option<usize>,
  #[serde(default)]
  pub eos_token_id: Option<TokenIds>,
  #[serde(default)]
  pub max_position_embeddings: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TokenIds {
  One(u32),
  Many(Vec<u32>),
}

impl TokenIds {
  pub fn to_vec(&self) -> Vec<u32> {
    match self {
      Self::One(id) => vec![*id],
      Self::Many(ids) => ids.clone(),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct GenerationConfig {
  #[serde(default)]
  eos_token_id: Option<TokenIds>,
}

impl ModelConfig {
  pub fn kv_heads(&self) -> usize {
    self.num_key_value_heads.unwrap_or(self.num_attention_heads)
  }

  pub fn head_size(&self) -> usize {
    self.head_dim.unwrap_or(self.hidden_size / self.num_attention_heads.max(1))
  }
}

/// On-disk layout of the language model directory
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
  pub tokenizer: PathBuf,
  pub config: PathBuf,
  pub generation_config: Option<PathBuf>,
  pub model: PathBuf,
}

pub fn resolve_model_files(model_dir: &Path) -> Result<ModelFiles, ClerkError> {
  if !model_dir.is_dir() {
    return Err(ClerkError::model_load(model_dir, "model directory does not exist"));
  }

  let required = |name: &str| {
    let path = model_dir.join(name);
    if path.is_file() {
      Ok(path)
    } else {
      Err(ClerkError::model_load(model_dir, format!("{name} not found")))
    }
  };

  let tokenizer = required(TOKENIZER_FILE)?;
  let config = required(CONFIG_FILE)?;
  let generation_config = Some(model_dir.join(GENERATION_CONFIG_FILE)).filter(|p| p.is_file());
  let model = MODEL_FILES
    .iter()
    .map(|name| model_dir.join(name))
    .find(|path| path.is_file())
    .ok_or_else(|| ClerkError::model_load(model_dir, "no ONNX decoder found"))?;

  Ok(ModelFiles { tokenizer, config, generation_config, model })
}

/// Read `config.json`, letting `generation_config.json` override the EOS ids
pub fn read_model_config(files: &ModelFiles) -> Result<(ModelConfig, Vec<u32>), ClerkError> {
  let content =
    fs::read_to_string(&files.config).map_err(|e| ClerkError::model_load(&files.config, e.to_string()))?;
  let config: ModelConfig =
    serde_json::from_str(&content).map_err(|e| ClerkError::model_load(&files.config, e.to_string()))?;

  let generation = match &files.generation_config {
    Some(path) => {
      let content = fs::read_to_string(path).map_err(|e| ClerkError::model_load(path, e.to_string()))?;
      serde_json::from_str::<GenerationConfig>(&content).unwrap_or_else(|e| {
        herald::warn!(&format!("Ignoring malformed {}: {e}", path.display()));
        GenerationConfig::default()
      })
    }
    None => GenerationConfig::default(),
  };

  let eos = generation
    .eos_token_id
    .or_else(|| config.eos_token_id.clone())
    .map(|ids| ids.to_vec())
    .filter(|ids| !ids.is_empty())
    .ok_or_else(|| ClerkError::model_load(&files.config, "no eos_token_id configured"))?;

  Ok((config, eos))
}

/// Boolean input of merged decoder exports selecting the with-past branch
const USE_CACHE_BRANCH: &str = "use_cache_branch";

/// Host-side values for one decoder step
#[derive(Debug, Clone, PartialEq)]
pub struct StepInputs {
  /// Tokens not yet in the cache
  pub input_ids: Vec<i64>,
  /// Covers the cache and the fresh tokens
  pub attention_mask: Vec<i64>,
  pub position_ids: Option<Vec<i64>>,
  pub use_cache_branch: Option<bool>,
}

/// Plan the inputs of one step given the model's input names, every token so
/// far and how many of them the cache already holds. Optional inputs are only
/// produced when the model declares them.
pub fn step_inputs(input_names: &[String], tokens: &[u32], past_len: usize) -> StepInputs {
  let expects = |name: &str| input_names.iter().any(|n| n == name);
  let past_len = past_len.min(tokens.len());
  let total = tokens.len();

  StepInputs {
    input_ids: tokens[past_len..].iter().map(|&t| t as i64).collect(),
    attention_mask: vec![1; total],
    position_ids: expects("position_ids").then(|| (past_len as i64..total as i64).collect()),
    use_cache_branch: expects(USE_CACHE_BRANCH).then_some(past_len > 0),
  }
}

/// Text generated after the prompt, cut from the decoding of the whole
/// sequence so word boundaries at the seam survive.
pub fn continuation_after_prompt(full: &str, decoded_prompt: &str) -> String {
  full.chars().skip(decoded_prompt.chars().count()).collect()
}

/// Key/value tensors carried between decoding steps
#[cfg(feature = "onnx")]
struct KvCache {
  layers: Vec<(Array4<f32>, Array4<f32>)>,
  past_len: usize,
}

#[cfg(feature = "onnx")]
pub struct OnnxCausalLm {
  session: Session,
  tokenizer: tokenizers::Tokenizer,
  config: ModelConfig,
  eos: Vec<u32>,
  input_names: Vec<String>,
  params: DecodingParams,
  seed: Option<u64>,
}

#[cfg(feature = "onnx")]
#[cfg(not(tarpaulin_include))]
impl OnnxCausalLm {
  pub fn load(config: &Config) -> Result<Self> {
    let files = resolve_model_files(&config.model_dir)?;
    let (model_config, eos) = read_model_config(&files)?;

    herald::info!(&format!("Loading language model from {}", config.model_dir.display()));
    let tokenizer = tokenizers::Tokenizer::from_file(&files.tokenizer)
      .map_err(|e| ClerkError::model_load(&files.tokenizer, e.to_string()))?;
    let session = crate::embedding::cpu_session(&files.model)?;
    let input_names = session.inputs.iter().map(|input| input.name.to_string()).collect();

    Ok(Self {
      session,
      tokenizer,
      config: model_config,
      eos,
      input_names,
      params: config.decoding.clone(),
      seed: config.seed,
    })
  }
}

#[cfg(feature = "onnx")]
impl TextGenerator for OnnxCausalLm {
  fn generate(&mut self, prompt: &str) -> Result<String> {
    let continuation =
      self.sample_continuation(prompt).map_err(|e| ClerkError::generation(format!("{e:#}")))?;
    Ok(format!("{prompt}{continuation}"))
  }
}

#[cfg(feature = "onnx")]
impl OnnxCausalLm {
  fn uses_cache(&self) -> bool {
    self.input_names.iter().any(|name| name.starts_with("past_key_values."))
  }

  fn sample_continuation(&mut self, prompt: &str) -> Result<String> {
    let encoding = self.tokenizer.encode(prompt, true).map_err(|e| ClerkError::tokenizer(e.to_string()))?;
    let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
    let prompt_len = tokens.len();

    if let Some(limit) = self.config.max_position_embeddings {
      if prompt_len + self.params.max_new_tokens > limit {
        herald::warn!(&format!(
          "Prompt ({prompt_len} tokens) plus {} new tokens exceeds the model's {limit} positions",
          self.params.max_new_tokens
        ));
      }
    }

    let mut sampler = Sampler::new(self.params.clone(), self.seed);
    let mut cache = if self.uses_cache() { Some(self.empty_cache()?) } else { None };
    let mut generated: Vec<u32> = Vec::new();
    let started = Instant::now();

    for _ in 0..self.params.max_new_tokens {
      let logits = self.forward(&tokens, cache.as_mut())?;
      let next = sampler.next_token(&logits, &tokens)?;
      if self.eos.contains(&next) {
        break;
      }
      tokens.push(next);
      generated.push(next);
    }

    let elapsed = started.elapsed().as_secs_f32();
    herald::info!(&format!(
      "Generated {} tokens from a {}-token prompt in {:.1}s",
      generated.len(),
      prompt_len,
      elapsed
    ));

    let decode = |ids: &[u32]| self.tokenizer.decode(ids, true).map_err(|e| ClerkError::tokenizer(e.to_string()));
    let full = decode(tokens.as_slice())?;
    let decoded_prompt = decode(&tokens[..prompt_len])?;
    Ok(continuation_after_prompt(&full, &decoded_prompt))
  }

  fn empty_cache(&self) -> Result<KvCache> {
    let shape = (1, self.config.kv_heads(), 0, self.config.head_size());
    let layers = (0..self.config.num_hidden_layers)
      .map(|_| (Array4::<f32>::zeros(shape), Array4::<f32>::zeros(shape)))
      .collect();
    Ok(KvCache { layers, past_len: 0 })
  }

  /// Run the decoder over the tokens not yet in the cache and return the
  /// logits of the final position.
  fn forward(&mut self, tokens: &[u32], cache: Option<&mut KvCache>) -> Result<Vec<f32>> {
    let past_len = cache.as_ref().map(|c| c.past_len).unwrap_or(0);
    let total = tokens.len();
    let step = step_inputs(&self.input_names, tokens, past_len);

    let mut inputs: HashMap<String, Value> = HashMap::new();
    let fresh = step.input_ids.len();
    inputs.insert("input_ids".to_string(), Tensor::from_array(([1, fresh], step.input_ids.into_boxed_slice()))?.into());
    inputs.insert("attention_mask".to_string(), Tensor::from_array(([1, total], step.attention_mask.into_boxed_slice()))?.into());

    if let Some(positions) = step.position_ids {
      let count = positions.len();
      inputs.insert("position_ids".to_string(), Tensor::from_array(([1, count], positions.into_boxed_slice()))?.into());
    }
    if let Some(branch) = step.use_cache_branch {
      inputs.insert(USE_CACHE_BRANCH.to_string(), Tensor::from_array(([1], vec![branch].into_boxed_slice()))?.into());
    }

    if let Some(cache) = cache.as_ref() {
      for (layer, (key, value)) in cache.layers.iter().enumerate() {
        inputs.insert(format!("past_key_values.{layer}.key"), Tensor::from_array(key.clone())?.into());
        inputs.insert(format!("past_key_values.{layer}.value"), Tensor::from_array(value.clone())?.into());
      }
    }

    let outputs = self.session.run(inputs)?;
    let logits = last_logits(&outputs)?;

    if let Some(cache) = cache {
      for (layer, slot) in cache.layers.iter_mut().enumerate() {
        *slot = (
          present(&outputs, &format!("present.{layer}.key"))?,
          present(&outputs, &format!("present.{layer}.value"))?,
        );
      }
      cache.past_len = total;
    }

    Ok(logits)
  }
}

#[cfg(feature = "onnx")]
fn last_logits(outputs: &SessionOutputs<'_>) -> Result<Vec<f32>> {
  let value = outputs.get("logits").ok_or_else(|| ClerkError::generation("model has no logits output"))?;
  let (shape, data) = value.try_extract_tensor::<f32>()?;
  let vocab = *shape.last().ok_or_else(|| ClerkError::generation("logits have no shape"))? as usize;
  if vocab == 0 || data.len() < vocab {
    return Err(ClerkError::generation("logits tensor is empty").into());
  }
  Ok(data[data.len() - vocab..].to_vec())
}

#[cfg(feature = "onnx")]
fn present(outputs: &SessionOutputs<'_>, name: &str) -> Result<Array4<f32>> {
  let value = outputs.get(name).ok_or_else(|| ClerkError::generation(format!("missing output {name}")))?;
  let (shape, data) = value.try_extract_tensor::<f32>()?;
  let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
  if dims.len() != 4 {
    return Err(ClerkError::generation(format!("{name} has rank {}", dims.len())).into());
  }
  Ok(Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const TINYLLAMA_CONFIG: &str = r#"{
    "architectures": ["LlamaForCausalLM"],
    "bos_token_id": 1,
    "eos_token_id": 2,
    "hidden_size": 2048,
    "max_position_embeddings": 2048,
    "num_attention_heads": 32,
    "num_hidden_layers": 22,
    "num_key_value_heads": 4
  }"#;

  fn model_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
      let path = dir.path().join(name);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, content).unwrap();
    }
    dir
  }

  #[test]
  fn test_mock_generator_echoes_prompt() {
    let mut generator = MockGenerator::new(" body");
    assert_eq!(generator.generate("prompt").unwrap(), "prompt body");
    assert_eq!(generator.prompts, vec!["prompt".to_string()]);
  }

  #[test]
  fn test_mock_generator_failure() {
    let mut generator = MockGenerator { fail: true, ..MockGenerator::new("") };
    assert!(generator.generate("prompt").is_err());
  }

  #[test]
  fn test_resolve_missing_directory() {
    let err = resolve_model_files(Path::new("/definitely/not/here")).unwrap_err();
    assert!(err.is_fatal());
  }

  #[test]
  fn test_resolve_requires_model_file() {
    let dir = model_dir(&[("tokenizer.json", "{}"), ("config.json", TINYLLAMA_CONFIG)]);
    let err = resolve_model_files(dir.path()).unwrap_err();
    assert!(err.to_string().contains("no ONNX decoder"));
  }

  #[test]
  fn test_resolve_finds_nested_model() {
    let dir = model_dir(&[
      ("tokenizer.json", "{}"),
      ("config.json", TINYLLAMA_CONFIG),
      ("onnx/model.onnx", ""),
    ]);
    let files = resolve_model_files(dir.path()).unwrap();
    assert_eq!(files.model, dir.path().join("onnx/model.onnx"));
    assert!(files.generation_config.is_none());
  }

  #[test]
  fn test_model_config_geometry() {
    let dir = model_dir(&[("tokenizer.json", "{}"), ("config.json", TINYLLAMA_CONFIG), ("model.onnx", "")]);
    let files = resolve_model_files(dir.path()).unwrap();
    let (config, eos) = read_model_config(&files).unwrap();
    assert_eq!(config.num_hidden_layers, 22);
    assert_eq!(config.kv_heads(), 4);
    assert_eq!(config.head_size(), 64);
    assert_eq!(config.max_position_embeddings, Some(2048));
    assert_eq!(eos, vec![2]);
  }

  #[test]
  fn test_generation_config_overrides_eos() {
    let dir = model_dir(&[
      ("tokenizer.json", "{}"),
      ("config.json", TINYLLAMA_CONFIG),
      ("generation_config.json", r#"{"eos_token_id": [2, 32000]}"#),
      ("model.onnx", ""),
    ]);
    let files = resolve_model_files(dir.path()).unwrap();
    let (_, eos) = read_model_config(&files).unwrap();
    assert_eq!(eos, vec![2, 32000]);
  }

  #[test]
  fn test_malformed_generation_config_falls_back() {
    let dir = model_dir(&[
      ("tokenizer.json", "{}"),
      ("config.json", TINYLLAMA_CONFIG),
      ("generation_config.json", "{ not json"),
      ("model.onnx", ""),
    ]);
    let files = resolve_model_files(dir.path()).unwrap();
    let (_, eos) = read_model_config(&files).unwrap();
    assert_eq!(eos, vec![2]);
  }

  #[test]
  fn test_resolve_finds_merged_decoder() {
    let dir = model_dir(&[
      ("tokenizer.json", "{}"),
      ("config.json", TINYLLAMA_CONFIG),
      ("onnx/decoder_model_merged.onnx", ""),
    ]);
    let files = resolve_model_files(dir.path()).unwrap();
    assert_eq!(files.model, dir.path().join("onnx/decoder_model_merged.onnx"));
  }

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_merged_decoder_switches_cache_branch() {
    let inputs = names(&[
      "input_ids",
      "attention_mask",
      "position_ids",
      "past_key_values.0.key",
      "past_key_values.0.value",
      "use_cache_branch",
    ]);

    let first = step_inputs(&inputs, &[1, 450, 3303], 0);
    assert_eq!(first.input_ids, vec![1, 450, 3303]);
    assert_eq!(first.position_ids, Some(vec![0, 1, 2]));
    assert_eq!(first.use_cache_branch, Some(false));

    let next = step_inputs(&inputs, &[1, 450, 3303, 29901], 3);
    assert_eq!(next.input_ids, vec![29901]);
    assert_eq!(next.attention_mask, vec![1; 4]);
    assert_eq!(next.position_ids, Some(vec![3]));
    assert_eq!(next.use_cache_branch, Some(true));
  }

  #[test]
  fn test_plain_decoder_gets_only_declared_inputs() {
    let step = step_inputs(&names(&["input_ids", "attention_mask"]), &[1, 2], 0);
    assert_eq!(step.position_ids, None);
    assert_eq!(step.use_cache_branch, None);
  }

  #[test]
  fn test_continuation_keeps_leading_space() {
    // a word-initial first token decodes without its space on its own
    let full = "Write the contract.\nCONTRACT: This Agreement";
    let prompt = "Write the contract.\nCONTRACT:";
    assert_eq!(continuation_after_prompt(full, prompt), " This Agreement");
    assert_eq!(continuation_after_prompt("déjà vu", "déjà"), " vu");
  }

  #[test]
  fn test_missing_eos_is_load_error() {
    let config = r#"{"hidden_size": 64, "num_attention_heads": 4, "num_hidden_layers": 2}"#;
    let dir = model_dir(&[("tokenizer.json", "{}"), ("config.json", config), ("model.onnx", "")]);
    let files = resolve_model_files(dir.path()).unwrap();
    assert!(matches!(read_model_config(&files), Err(ClerkError::ModelLoad { .. })));
  }
}
