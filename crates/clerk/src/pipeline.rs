//! The contract generation pipeline
//!
//! One request runs load, chunk, embed, retrieve, assemble, generate and
//! extract as a single blocking call. Nothing survives between requests: the
//! similarity index is rebuilt and both models are loaded again each time, and
//! are dropped when the call returns, whether it succeeded or not.

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::category::ContractCategory;
use crate::chunker::TextSplitter;
use crate::config::Config;
use crate::embedding::{EmbeddingModel, MockEmbeddingModel};
use crate::error::ClerkError;
use crate::extract::{extract_contract, has_delimiter};
use crate::generator::{MockGenerator, TextGenerator};
use crate::index::SimilarityIndex;
use crate::loader::load_templates;
use crate::prompt::{assemble_prompt, ContractFields, DELIMITER};
use crate::retriever::{reference_text, retrieve};

/// Source of the embedding and language models
pub trait ModelBackend: Send + Sync {
  fn load_embedder(&self, config: &Config) -> Result<Box<dyn EmbeddingModel>>;
  fn load_generator(&self, config: &Config) -> Result<Box<dyn TextGenerator>>;
}

/// Models read from local ONNX exports
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxBackend;

impl ModelBackend for OnnxBackend {
  #[cfg(feature = "onnx")]
  fn load_embedder(&self, config: &Config) -> Result<Box<dyn EmbeddingModel>> {
    Ok(Box::new(crate::embedding::OnnxEmbeddingModel::load(config)?))
  }

  #[cfg(not(feature = "onnx"))]
  fn load_embedder(&self, config: &Config) -> Result<Box<dyn EmbeddingModel>> {
    Err(ClerkError::model_load(&config.cache_dir, "clerk was built without the onnx feature").into())
  }

  #[cfg(feature = "onnx")]
  fn load_generator(&self, config: &Config) -> Result<Box<dyn TextGenerator>> {
    Ok(Box::new(crate::generator::OnnxCausalLm::load(config)?))
  }

  #[cfg(not(feature = "onnx"))]
  fn load_generator(&self, config: &Config) -> Result<Box<dyn TextGenerator>> {
    Err(ClerkError::model_load(&config.model_dir, "clerk was built without the onnx feature").into())
  }
}

/// Deterministic in-process models for tests and dry runs
#[derive(Debug, Clone)]
pub struct MockBackend {
  pub continuation: String,
  pub fail_embedder: bool,
  pub fail_generator: bool,
}

impl MockBackend {
  pub fn new(continuation: impl Into<String>) -> Self {
    Self { continuation: continuation.into(), fail_embedder: false, fail_generator: false }
  }
}

impl ModelBackend for MockBackend {
  fn load_embedder(&self, config: &Config) -> Result<Box<dyn EmbeddingModel>> {
    if self.fail_embedder {
      return Err(ClerkError::model_load(&config.cache_dir, "mock embedder unavailable").into());
    }
    Ok(Box::new(MockEmbeddingModel::new()))
  }

  fn load_generator(&self, config: &Config) -> Result<Box<dyn TextGenerator>> {
    if self.fail_generator {
      return Err(ClerkError::model_load(&config.model_dir, "mock generator unavailable").into());
    }
    Ok(Box::new(MockGenerator::new(self.continuation.clone())))
  }
}

/// Retrieved template text and where it came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
  /// Joined passages, `None` when the corpus was empty
  pub text: Option<String>,
  pub documents: usize,
  pub chunks: usize,
  pub retrieved: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContract {
  pub category: ContractCategory,
  pub prompt: String,
  /// Model output, prompt included
  pub raw: String,
  /// Contract body following the last delimiter
  pub text: String,
  pub delimiter_found: bool,
  pub reference: Reference,
}

pub struct ContractWriter {
  config: Config,
  backend: Box<dyn ModelBackend>,
}

impl ContractWriter {
  pub fn new(config: Config, backend: impl ModelBackend + 'static) -> Self {
    Self { config, backend: Box::new(backend) }
  }

  pub fn onnx(config: Config) -> Self {
    Self::new(config, OnnxBackend)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Run the whole pipeline for one request
  pub fn generate(&self, category: ContractCategory, fields: &ContractFields) -> Result<GeneratedContract> {
    let reference = self.gather_reference(category)?;
    let prompt = self.prompt_with(category, fields, &reference);

    herald::info!("Loading language model...");
    let raw = {
      let mut generator = self.backend.load_generator(&self.config)?;
      herald::info!(&format!("Drafting {}...", category.title()));
      generator.generate(&prompt)?
    };

    let delimiter_found = has_delimiter(&raw, DELIMITER);
    let text = extract_contract(&raw, DELIMITER);
    herald::success!(&format!("Drafted {} ({} characters)", category.title(), text.chars().count()));

    Ok(GeneratedContract { category, prompt, raw, text, delimiter_found, reference })
  }

  /// Prompt the model would receive. With `retrieval` off, the fallback
  /// reference is used and no model is loaded.
  pub fn build_prompt(&self, category: ContractCategory, fields: &ContractFields, retrieval: bool) -> Result<String> {
    let reference = if retrieval { self.gather_reference(category)? } else { Reference::default() };
    Ok(self.prompt_with(category, fields, &reference))
  }

  fn prompt_with(&self, category: ContractCategory, fields: &ContractFields, reference: &Reference) -> String {
    assemble_prompt(category, fields, reference.text.as_deref(), self.config.reference_limit)
  }

  /// Load, chunk, embed and search the category's templates
  pub fn gather_reference(&self, category: ContractCategory) -> Result<Reference> {
    let documents = load_templates(category, &self.config);
    if documents.is_empty() {
      herald::warn!(&format!("No {} templates found, using the standard reference", category.title()));
      return Ok(Reference::default());
    }

    let splitter = TextSplitter::new(self.config.chunk_size, self.config.chunk_overlap);
    let chunks = splitter.split_documents(&documents);
    if chunks.is_empty() {
      herald::warn!("Templates contain no text, using the standard reference");
      return Ok(Reference { documents: documents.len(), ..Reference::default() });
    }
    herald::verbose!(&format!("Split {} templates into {} chunks", documents.len(), chunks.len()));

    let mut embedder = self.backend.load_embedder(&self.config)?;
    let chunk_count = chunks.len();
    let index = SimilarityIndex::build(chunks, embedder.as_mut())?;
    let results = retrieve(&index, embedder.as_mut(), &category.retrieval_query(), self.config.top_k)?;

    Ok(Reference {
      text: Some(reference_text(&results)),
      documents: documents.len(),
      chunks: chunk_count,
      retrieved: results.len(),
    })
  }
}

/// Run [`ContractWriter::generate`] on the blocking pool. The handle resolves
/// once generation finishes; it cannot be cancelled part way.
pub fn spawn_generation(
  writer: ContractWriter,
  category: ContractCategory,
  fields: ContractFields,
) -> JoinHandle<Result<GeneratedContract>> {
  tokio::task::spawn_blocking(move || writer.generate(category, &fields))
}
