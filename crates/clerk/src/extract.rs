/// Contract body from raw model output: everything after the last
/// `delimiter`, trimmed. Output without the delimiter is returned untouched.
pub fn extract_contract(raw: &str, delimiter: &str) -> String {
  match raw.rfind(delimiter) {
    Some(pos) if !delimiter.is_empty() => raw[pos + delimiter.len()..].trim().to_string(),
    _ => {
      herald::warn!("Delimiter missing from model output; returning raw text");
      raw.to_string()
    }
  }
}

/// Whether `raw` contains the delimiter at all
pub fn has_delimiter(raw: &str, delimiter: &str) -> bool {
  !delimiter.is_empty() && raw.contains(delimiter)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prompt::DELIMITER;

  #[test]
  fn test_body_after_delimiter_is_trimmed() {
    let raw = format!("Write a contract.\n{DELIMITER}\n\n  1. Parties\nAcme and Lee.\n\n");
    assert_eq!(extract_contract(&raw, DELIMITER), "1. Parties\nAcme and Lee.");
  }

  #[test]
  fn test_last_occurrence_wins() {
    let raw = format!("prompt {DELIMITER} echoed {DELIMITER} body");
    assert_eq!(extract_contract(&raw, DELIMITER), "body");
  }

  #[test]
  fn test_missing_delimiter_returns_raw() {
    let raw = "  The model rambled without a marker.\n";
    assert_eq!(extract_contract(raw, DELIMITER), raw);
    assert!(!has_delimiter(raw, DELIMITER));
  }

  #[test]
  fn test_prefix_body_law() {
    for (prefix, body) in [("", ""), ("abc", " x "), ("CONTRACT", "\n\tterms\n"), ("a\nb", "1. Parties")] {
      let raw = format!("{prefix}{DELIMITER}{body}");
      assert_eq!(extract_contract(&raw, DELIMITER), body.trim());
    }
  }

  #[test]
  fn test_delimiter_at_end_gives_empty_body() {
    assert_eq!(extract_contract("text CONTRACT:", DELIMITER), "");
  }
}
