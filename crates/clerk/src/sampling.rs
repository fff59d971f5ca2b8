//! Next-token selection
//!
//! Logits pass through the processors in a fixed order: repetition penalty,
//! temperature, top-k truncation, nucleus (top-p) filtering. The survivors are renormalised and
//! one token is drawn. With sampling disabled the highest penalised logit wins.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ClerkError;

/// Decoding configuration for the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodingParams {
  pub do_sample: bool,
  pub max_new_tokens: usize,
  pub temperature: f32,
  /// Candidates kept before nucleus filtering; 0 keeps the whole vocabulary
  pub top_k: usize,
  pub top_p: f32,
  pub repetition_penalty: f32,
}

impl Default for DecodingParams {
  fn default() -> Self {
    Self {
      do_sample: true,
      max_new_tokens: 2000,
      temperature: 0.6,
      top_k: 50,
      top_p: 0.9,
      repetition_penalty: 1.1,
    }
  }
}

impl DecodingParams {
  pub fn validate(&self) -> Result<(), ClerkError> {
    if self.max_new_tokens == 0 {
      return Err(ClerkError::config("decoding.max_new_tokens must be positive"));
    }
    if self.temperature <= 0.0 || !self.temperature.is_finite() {
      return Err(ClerkError::config("decoding.temperature must be positive"));
    }
    if !(self.top_p > 0.0 && self.top_p <= 1.0) {
      return Err(ClerkError::config("decoding.top_p must be in (0, 1]"));
    }
    if self.repetition_penalty <= 0.0 || !self.repetition_penalty.is_finite() {
      return Err(ClerkError::config("decoding.repetition_penalty must be positive"));
    }
    Ok(())
  }
}

pub struct Sampler {
  params: DecodingParams,
  rng: StdRng,
}

impl Sampler {
  pub fn new(params: DecodingParams, seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Self { params, rng }
  }

  /// Pick the next token id given the raw logits of the last position and
  /// every token seen so far (prompt included).
  pub fn next_token(&mut self, logits: &[f32], context: &[u32]) -> Result<u32, ClerkError> {
    if logits.is_empty() {
      return Err(ClerkError::generation("model returned empty logits"));
    }

    let mut scores = logits.to_vec();
    apply_repetition_penalty(&mut scores, context, self.params.repetition_penalty);

    if !self.params.do_sample {
      return Ok(argmax(&scores));
    }

    apply_temperature(&mut scores, self.params.temperature);
    apply_top_k(&mut scores, self.params.top_k);
    let probs = softmax(&scores);
    let candidates = nucleus(&probs, self.params.top_p);
    Ok(self.draw(&candidates))
  }

  fn draw(&mut self, candidates: &[(u32, f32)]) -> u32 {
    let total: f32 = candidates.iter().map(|(_, p)| p).sum();
    let mut target = self.rng.gen::<f32>() * total;
    for &(token, p) in candidates {
      if target < p {
        return token;
      }
      target -= p;
    }
    // float drift past the last bucket
    candidates.last().map(|(token, _)| *token).unwrap_or(0)
  }
}

/// Penalise every token already present: positive logits are divided by the
/// penalty, negative ones multiplied, each token at most once.
pub fn apply_repetition_penalty(scores: &mut [f32], context: &[u32], penalty: f32) {
  if (penalty - 1.0).abs() < f32::EPSILON {
    return;
  }

  let mut seen = vec![false; scores.len()];
  for &token in context {
    let idx = token as usize;
    if idx >= scores.len() || seen[idx] {
      continue;
    }
    seen[idx] = true;
    let score = scores[idx];
    scores[idx] = if score < 0.0 { score * penalty } else { score / penalty };
  }
}

pub fn apply_temperature(scores: &mut [f32], temperature: f32) {
  for score in scores.iter_mut() {
    *score /= temperature;
  }
}

/// Mask everything outside the `k` highest scores with negative infinity.
/// `k == 0` leaves the scores untouched.
pub fn apply_top_k(scores: &mut [f32], k: usize) {
  if k == 0 || k >= scores.len() {
    return;
  }

  let mut order: Vec<usize> = (0..scores.len()).collect();
  order.select_nth_unstable_by(k - 1, |&a, &b| {
    scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal)
  });
  for &idx in &order[k..] {
    scores[idx] = f32::NEG_INFINITY;
  }
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
  let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

/// Smallest set of most probable tokens whose cumulative probability reaches
/// `top_p`, in descending probability. Always keeps at least one token.
pub fn nucleus(probs: &[f32], top_p: f32) -> Vec<(u32, f32)> {
  let mut ranked: Vec<(u32, f32)> =
    probs.iter().enumerate().filter(|(_, p)| **p > 0.0).map(|(token, &p)| (token as u32, p)).collect();
  ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

  let mut cumulative = 0.0;
  let mut keep = 0;
  for &(_, p) in &ranked {
    keep += 1;
    cumulative += p;
    if cumulative >= top_p {
      break;
    }
  }

  ranked.truncate(keep.max(1));
  ranked
}

pub fn argmax(scores: &[f32]) -> u32 {
  scores
    .iter()
    .enumerate()
    .fold((0usize, f32::NEG_INFINITY), |best, (idx, &score)| if score > best.1 { (idx, score) } else { best })
    .0 as u32
}
