//! Runtime configuration
//!
//! Everything the pipeline reads from the environment goes through [`Config`]:
//! defaults, then an optional YAML file, then `CLERK_*` variables. The binary
//! applies its own flags last and validates the result.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ClerkError;
use crate::sampling::DecodingParams;

pub const CONFIG_FILE: &str = "clerk.yaml";
pub const DEFAULT_MODEL_DIR: &str = "./models/tinyllama-1.1b-chat";
pub const DEFAULT_CACHE_DIR: &str = "./hf_cache";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

pub const TEMPLATE_DIR_ENV: &str = "CLERK_TEMPLATE_DIR";
pub const MODEL_DIR_ENV: &str = "CLERK_MODEL_DIR";
pub const CACHE_DIR_ENV: &str = "CLERK_CACHE_DIR";
pub const EMBEDDING_DIR_ENV: &str = "CLERK_EMBEDDING_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Directory template file names are resolved against
  pub template_dir: PathBuf,
  /// Causal language model directory
  pub model_dir: PathBuf,
  /// Hugging Face cache holding the embedding model
  pub cache_dir: PathBuf,
  pub embedding_model: String,
  /// Explicit embedding model directory, bypassing the cache lookup
  pub embedding_dir: Option<PathBuf>,
  /// Models are read from local storage only
  pub offline: bool,
  pub chunk_size: usize,
  pub chunk_overlap: usize,
  pub top_k: usize,
  /// Characters of retrieved text kept in the prompt
  pub reference_limit: usize,
  pub seed: Option<u64>,
  pub decoding: DecodingParams,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      template_dir: PathBuf::from("."),
      model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
      cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
      embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
      embedding_dir: None,
      offline: true,
      chunk_size: 1000,
      chunk_overlap: 100,
      top_k: 3,
      reference_limit: 1200,
      seed: None,
      decoding: DecodingParams::default(),
    }
  }
}

impl Config {
  /// Defaults, overlaid with `path` (or `clerk.yaml` in the working directory
  /// when present), overlaid with the environment.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
      None => Self::default(),
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
  }

  pub fn from_yaml(content: &str) -> Result<Self> {
    if content.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(content)?)
  }

  pub fn apply_env(&mut self) {
    if let Some(dir) = env_path(TEMPLATE_DIR_ENV) {
      self.template_dir = dir;
    }
    if let Some(dir) = env_path(MODEL_DIR_ENV) {
      self.model_dir = dir;
    }
    if let Some(dir) = env_path(CACHE_DIR_ENV) {
      self.cache_dir = dir;
    }
    if let Some(dir) = env_path(EMBEDDING_DIR_ENV) {
      self.embedding_dir = Some(dir);
    }
  }

  pub fn validate(&self) -> Result<(), ClerkError> {
    if !self.offline {
      return Err(ClerkError::config("offline must stay enabled; models are only read from disk"));
    }
    if self.chunk_size == 0 {
      return Err(ClerkError::config("chunk_size must be positive"));
    }
    if self.chunk_overlap >= self.chunk_size {
      return Err(ClerkError::config(format!(
        "chunk_overlap ({}) must be smaller than chunk_size ({})",
        self.chunk_overlap, self.chunk_size
      )));
    }
    if self.top_k == 0 {
      return Err(ClerkError::config("top_k must be positive"));
    }
    self.decoding.validate()
  }

  /// Full path of a template file name
  pub fn template_path(&self, file_name: &str) -> PathBuf {
    self.template_dir.join(file_name)
  }
}

fn env_path(name: &str) -> Option<PathBuf> {
  env::var_os(name).filter(|value| !value.is_empty()).map(PathBuf::from)
}
