//! Recursive character splitting
//!
//! Text is cut on the coarsest separator that occurs in it (blank line, then
//! newline, then space, then between characters). Pieces are greedily packed
//! back together up to `chunk_size` characters, and each new chunk starts with
//! up to `chunk_overlap` characters carried over from the end of the previous
//! one. Separators stay attached to the front of the piece that follows them,
//! so every chunk is a trimmed, contiguous slice of its source.
//!
//! Lengths are counted in characters, not bytes.

use std::path::PathBuf;

use crate::loader::TemplateDocument;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Bounded slice of a template used as the unit of retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
  pub text: String,
  pub source: PathBuf,
  /// Position of this chunk within its source
  pub index: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
  chunk_size: usize,
  chunk_overlap: usize,
  separators: Vec<String>,
}

impl Default for TextSplitter {
  fn default() -> Self {
    Self::new(1000, 100)
  }
}

impl TextSplitter {
  pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
    Self {
      chunk_size,
      chunk_overlap,
      separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
    }
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn chunk_overlap(&self) -> usize {
    self.chunk_overlap
  }

  /// Chunks of every document, in document order then position
  pub fn split_documents(&self, documents: &[TemplateDocument]) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents
      .iter()
      .flat_map(|document| {
        self.split_text(&document.text).into_iter().enumerate().map(|(index, text)| Chunk {
          text,
          source: document.source.clone(),
          index,
        })
      })
      .collect();

    herald::info!(&format!("Split {} documents into {} chunks", documents.len(), chunks.len()));
    chunks
  }

  pub fn split_text(&self, text: &str) -> Vec<String> {
    self.split_recursive(text, &self.separators)
  }

  fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
    let (separator, remaining) = pick_separator(text, separators);
    let splits = split_keeping_separator(text, &separator);

    let mut chunks = Vec::new();
    let mut fitting: Vec<String> = Vec::new();

    for split in splits {
      if char_len(&split) < self.chunk_size {
        fitting.push(split);
        continue;
      }

      if !fitting.is_empty() {
        chunks.extend(self.merge(&std::mem::take(&mut fitting)));
      }

      if remaining.is_empty() {
        chunks.push(split);
      } else {
        chunks.extend(self.split_recursive(&split, remaining));
      }
    }

    if !fitting.is_empty() {
      chunks.extend(self.merge(&fitting));
    }

    chunks
  }

  /// Greedy packing with carry-over. Separators are already attached to the
  /// pieces, so pieces are concatenated directly.
  fn merge(&self, splits: &[String]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: std::collections::VecDeque<(&str, usize)> = std::collections::VecDeque::new();
    let mut total = 0;

    for split in splits {
      let len = char_len(split);

      if total + len > self.chunk_size && !window.is_empty() {
        if let Some(chunk) = join_window(&window) {
          chunks.push(chunk);
        }

        while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
          match window.pop_front() {
            Some((_, front_len)) => total -= front_len,
            None => break,
          }
        }
      }

      window.push_back((split.as_str(), len));
      total += len;
    }

    if let Some(chunk) = join_window(&window) {
      chunks.push(chunk);
    }

    chunks
  }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (String, &'a [String]) {
  for (i, separator) in separators.iter().enumerate() {
    if separator.is_empty() {
      return (String::new(), &[]);
    }
    if text.contains(separator.as_str()) {
      return (separator.clone(), &separators[i + 1..]);
    }
  }

  (separators.last().cloned().unwrap_or_default(), &[])
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
  if separator.is_empty() {
    return text.chars().map(String::from).collect();
  }

  let mut pieces = text.split(separator);
  let mut splits: Vec<String> = pieces.next().map(|first| vec![first.to_string()]).unwrap_or_default();
  splits.extend(pieces.map(|piece| format!("{separator}{piece}")));
  splits.retain(|s| !s.is_empty());
  splits
}

fn join_window(window: &std::collections::VecDeque<(&str, usize)>) -> Option<String> {
  let joined: String = window.iter().map(|(s, _)| *s).collect();
  let trimmed = joined.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_string())
  }
}

fn char_len(s: &str) -> usize {
  s.chars().count()
}
