use std::fs;
use std::path::Path;

use crate::error::ClerkError;

pub const DEFAULT_OUTPUT_FILE: &str = "generated_contract.txt";

/// Save the contract text unchanged, creating parent directories as needed.
/// An existing file is replaced.
pub fn write_contract(path: &Path, text: &str) -> Result<(), ClerkError> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  fs::write(path, text)?;

  herald::verbose!(&format!("Wrote {}", path.display()));
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_write_creates_parents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drafts/nda").join(DEFAULT_OUTPUT_FILE);

    write_contract(&path, "1. Parties").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "1. Parties");
  }

  #[test]
  fn test_saved_file_matches_text_exactly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(DEFAULT_OUTPUT_FILE);
    let text = "1. Parties\n\n10. Signatures\n____________";

    write_contract(&path, text).unwrap();
    assert_eq!(fs::read(&path).unwrap(), text.as_bytes());
  }

  #[test]
  fn test_write_replaces_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(DEFAULT_OUTPUT_FILE);
    fs::write(&path, "old draft that is longer").unwrap();

    write_contract(&path, "new\n").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
  }
}
