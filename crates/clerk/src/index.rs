//! In-memory similarity index
//!
//! Exact search: every query is scored against every stored vector by inner
//! product. Vectors are unit length, so the score is cosine similarity. The
//! corpus is a handful of templates, so a linear scan is all it needs.

use anyhow::Result;

use crate::chunker::Chunk;
use crate::embedding::EmbeddingModel;
use crate::error::ClerkError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk<'a> {
  pub chunk: &'a Chunk,
  pub score: f32,
}

#[derive(Debug, Default)]
pub struct SimilarityIndex {
  dimension: usize,
  vectors: Vec<Vec<f32>>,
  chunks: Vec<Chunk>,
}

impl SimilarityIndex {
  /// Embed every chunk and index it
  pub fn build(chunks: Vec<Chunk>, model: &mut dyn EmbeddingModel) -> Result<Self> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = model.compute_embeddings(&texts)?;
    let index = Self::from_parts(chunks, vectors)?;

    herald::info!(&format!("Indexed {} chunks ({} dimensions)", index.len(), index.dimension));
    Ok(index)
  }

  /// Index precomputed vectors, one per chunk
  pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, ClerkError> {
    if chunks.len() != vectors.len() {
      return Err(ClerkError::embedding(format!(
        "{} vectors for {} chunks",
        vectors.len(),
        chunks.len()
      )));
    }

    let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
      return Err(ClerkError::embedding(format!(
        "dimension mismatch: expected {dimension}, got {}",
        bad.len()
      )));
    }

    Ok(Self { dimension, vectors, chunks })
  }

  pub fn len(&self) -> usize {
    self.chunks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chunks.is_empty()
  }

  pub fn dimension(&self) -> usize {
    self.dimension
  }

  /// The `k` best matches, best first. Equal scores keep index order.
  pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk<'_>>, ClerkError> {
    if self.is_empty() || k == 0 {
      return Ok(vec![]);
    }
    if query.len() != self.dimension {
      return Err(ClerkError::embedding(format!(
        "query has {} dimensions, index has {}",
        query.len(),
        self.dimension
      )));
    }

    let mut scored: Vec<ScoredChunk<'_>> = self
      .vectors
      .iter()
      .zip(&self.chunks)
      .map(|(vector, chunk)| ScoredChunk { chunk, score: inner_product(vector, query) })
      .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    Ok(scored)
  }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}
