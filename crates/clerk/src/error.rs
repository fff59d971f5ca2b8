use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClerkError {
  #[error("Failed to load model from {}: {message}", path.display())]
  ModelLoad { path: PathBuf, message: String },

  #[error("Tokenizer failure: {message}")]
  Tokenizer { message: String },

  #[error("Embedding failed: {message}")]
  Embedding { message: String },

  #[error("Generation failed: {message}")]
  Generation { message: String },

  #[error("Could not read template {}: {message}", path.display())]
  Template { path: PathBuf, message: String },

  #[error("Invalid configuration: {message}")]
  Config { message: String },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl ClerkError {
  pub fn model_load(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
    Self::ModelLoad { path: path.as_ref().to_path_buf(), message: message.into() }
  }

  pub fn tokenizer(message: impl Into<String>) -> Self {
    Self::Tokenizer { message: message.into() }
  }

  pub fn embedding(message: impl Into<String>) -> Self {
    Self::Embedding { message: message.into() }
  }

  pub fn generation(message: impl Into<String>) -> Self {
    Self::Generation { message: message.into() }
  }

  pub fn template(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
    Self::Template { path: path.as_ref().to_path_buf(), message: message.into() }
  }

  pub fn config(message: impl Into<String>) -> Self {
    Self::Config { message: message.into() }
  }

  /// Model load and generation failures abort the request; nothing else does.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::ModelLoad { .. } | Self::Generation { .. } | Self::Tokenizer { .. })
  }
}
