use anyhow::Result;

use crate::embedding::EmbeddingModel;
use crate::index::{ScoredChunk, SimilarityIndex};

/// Embed `query` with the same model the index was built with and return the
/// `k` most similar chunks, best first.
pub fn retrieve<'a>(
  index: &'a SimilarityIndex,
  model: &mut dyn EmbeddingModel,
  query: &str,
  k: usize,
) -> Result<Vec<ScoredChunk<'a>>> {
  let query_vector = model.embed_query(query)?;
  let results = index.search(&query_vector, k)?;

  for (rank, result) in results.iter().enumerate() {
    herald::verbose!(&format!(
      "#{} score {:.3} from {} (chunk {})",
      rank + 1,
      result.score,
      result.chunk.source.display(),
      result.chunk.index
    ));
  }

  Ok(results)
}

/// Retrieved passages joined by blank lines, in rank order
pub fn reference_text(results: &[ScoredChunk<'_>]) -> String {
  results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chunker::Chunk;
  use crate::embedding::MockEmbeddingModel;
  use std::path::PathBuf;

  fn build(texts: &[&str]) -> (SimilarityIndex, MockEmbeddingModel) {
    let mut model = MockEmbeddingModel::new();
    let chunks = texts
      .iter()
      .enumerate()
      .map(|(index, text)| Chunk { text: text.to_string(), source: PathBuf::from("t.docx"), index })
      .collect();
    let index = SimilarityIndex::build(chunks, &mut model).unwrap();
    (index, model)
  }

  #[test]
  fn test_identical_query_ranks_first() {
    let texts = [
      "The Consultant shall keep all Confidential Information secret.",
      "Payment is due within thirty days of invoice.",
      "This Agreement is governed by the laws of the State of New York.",
      "Either party may terminate with written notice.",
    ];
    let (index, mut model) = build(&texts);

    for text in texts {
      let results = retrieve(&index, &mut model, text, 3).unwrap();
      assert_eq!(results[0].chunk.text, text);
      assert!(results.len() <= 3);
    }
  }

  #[test]
  fn test_results_descend_and_come_from_index() {
    let (index, mut model) = build(&["alpha beta", "beta gamma", "gamma delta", "delta epsilon"]);
    let results = retrieve(&index, &mut model, "beta gamma", 3).unwrap();

    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
      assert!(pair[0].score >= pair[1].score);
    }
    for result in &results {
      assert!(["alpha beta", "beta gamma", "gamma delta", "delta epsilon"].contains(&result.chunk.text.as_str()));
    }
  }

  #[test]
  fn test_reference_text_joins_in_rank_order() {
    let (index, mut model) = build(&["one two", "three four"]);
    let results = retrieve(&index, &mut model, "three four", 2).unwrap();
    assert_eq!(reference_text(&results), "three four\n\none two");
  }
}
