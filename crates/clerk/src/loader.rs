//! Template loading
//!
//! Turns the template files configured for a category into plain text. Files
//! that are missing are skipped quietly; files that exist but cannot be read
//! are skipped with a warning. An empty result is a valid outcome.

use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::category::ContractCategory;
use crate::config::Config;
use crate::error::ClerkError;

const DOCUMENT_PART: &str = "word/document.xml";
const HEADER_PREFIX: &str = "word/header";
const FOOTER_PREFIX: &str = "word/footer";

/// Text extracted from one template file
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDocument {
  pub source: PathBuf,
  pub text: String,
}

/// Load every configured template for `category` that exists under the
/// template directory, in configured order.
pub fn load_templates(category: ContractCategory, config: &Config) -> Vec<TemplateDocument> {
  let mut documents = Vec::new();

  for file_name in category.template_files() {
    let path = config.template_path(file_name);
    if !path.is_file() {
      herald::verbose!(&format!("Template not found, skipping: {}", path.display()));
      continue;
    }

    match load_document(&path) {
      Ok(document) => {
        herald::verbose!(&format!(
          "Loaded {} ({} characters)",
          path.display(),
          document.text.chars().count()
        ));
        documents.push(document);
      }
      Err(e) => herald::warn!(&format!("Skipping unreadable template: {e:#}")),
    }
  }

  herald::info!(&format!(
    "Loaded {} of {} templates for {}",
    documents.len(),
    category.template_files().len(),
    category
  ));
  documents
}

/// Extract the text of a single template file
pub fn load_document(path: &Path) -> Result<TemplateDocument> {
  let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

  let text = match ext.as_str() {
    "docx" => read_docx(path)?,
    "txt" | "md" | "markdown" => fs::read_to_string(path)
      .map_err(|e| ClerkError::template(path, e.to_string()))?,
    _ => return Err(ClerkError::template(path, format!("unsupported file type .{ext}")).into()),
  };

  Ok(TemplateDocument { source: path.to_path_buf(), text })
}

fn read_docx(path: &Path) -> Result<String> {
  let file = File::open(path).map_err(|e| ClerkError::template(path, e.to_string()))?;
  let mut archive =
    zip::ZipArchive::new(file).map_err(|e| ClerkError::template(path, e.to_string()))?;

  let names: Vec<String> = archive.file_names().map(str::to_string).collect();
  let parts = story_parts(&names, HEADER_PREFIX)
    .into_iter()
    .chain([DOCUMENT_PART.to_string()])
    .chain(story_parts(&names, FOOTER_PREFIX));

  let mut blocks = Vec::new();
  for part in parts {
    let mut xml = String::new();
    archive
      .by_name(&part)
      .map_err(|e| ClerkError::template(path, format!("{part}: {e}")))?
      .read_to_string(&mut xml)
      .map_err(|e| ClerkError::template(path, e.to_string()))?;

    let text = docx_text(&xml).map_err(|e| ClerkError::template(path, format!("{part}: {e}")))?;
    if !text.is_empty() {
      blocks.push(text);
    }
  }

  Ok(blocks.join("\n\n"))
}

/// Header or footer parts in name order, e.g. `word/header1.xml`
fn story_parts(names: &[String], prefix: &str) -> Vec<String> {
  let mut parts: Vec<String> =
    names.iter().filter(|name| name.starts_with(prefix) && name.ends_with(".xml")).cloned().collect();
  parts.sort();
  parts
}

#[derive(Default)]
struct TableText {
  rows: Vec<String>,
  cells: Vec<String>,
  cell: Vec<String>,
}

/// Flatten WordprocessingML into plain text.
///
/// Paragraphs (headings included) become blocks separated by a blank line.
/// A table becomes one block with a line per row and tab-separated cells.
pub fn docx_text(xml: &str) -> Result<String, quick_xml::Error> {
  let mut reader = Reader::from_str(xml);

  let mut blocks: Vec<String> = Vec::new();
  let mut tables: Vec<TableText> = Vec::new();
  let mut paragraph = String::new();
  let mut in_text = false;

  loop {
    match reader.read_event()? {
      Event::Start(e) => match e.local_name().as_ref() {
        b"t" => in_text = true,
        b"tbl" => tables.push(TableText::default()),
        _ => {}
      },
      Event::Empty(e) => match e.local_name().as_ref() {
        b"tab" => paragraph.push('\t'),
        b"br" | b"cr" => paragraph.push('\n'),
        _ => {}
      },
      Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
      Event::End(e) => match e.local_name().as_ref() {
        b"t" => in_text = false,
        b"p" => {
          let text = std::mem::take(&mut paragraph);
          let text = text.trim();
          if text.is_empty() {
            continue;
          }
          match tables.last_mut() {
            Some(table) => table.cell.push(text.to_string()),
            None => blocks.push(text.to_string()),
          }
        }
        b"tc" => {
          if let Some(table) = tables.last_mut() {
            let cell = std::mem::take(&mut table.cell).join(" ");
            table.cells.push(cell);
          }
        }
        b"tr" => {
          if let Some(table) = tables.last_mut() {
            let row = std::mem::take(&mut table.cells).join("\t");
            if !row.trim().is_empty() {
              table.rows.push(row);
            }
          }
        }
        b"tbl" => {
          if let Some(table) = tables.pop() {
            let text = table.rows.join("\n");
            if text.is_empty() {
              continue;
            }
            match tables.last_mut() {
              Some(outer) => outer.cell.push(text),
              None => blocks.push(text),
            }
          }
        }
        _ => {}
      },
      Event::Eof => break,
      _ => {}
    }
  }

  Ok(blocks.join("\n\n"))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn wrap(body: &str) -> String {
    format!(
      r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
  }

  #[test]
  fn test_paragraphs_become_blocks() {
    let xml = wrap(
      "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>CONSULTING AGREEMENT</w:t></w:r></w:p>\
       <w:p><w:r><w:t xml:space=\"preserve\">This Agreement is made </w:t></w:r><w:r><w:t>between the parties.</w:t></w:r></w:p>",
    );
    assert_eq!(
      docx_text(&xml).unwrap(),
      "CONSULTING AGREEMENT\n\nThis Agreement is made between the parties."
    );
  }

  #[test]
  fn test_empty_paragraphs_are_dropped() {
    let xml = wrap("<w:p/><w:p><w:r><w:t>Only</w:t></w:r></w:p><w:p><w:r><w:t>  </w:t></w:r></w:p>");
    assert_eq!(docx_text(&xml).unwrap(), "Only");
  }

  #[test]
  fn test_tabs_breaks_and_entities() {
    let xml = wrap("<w:p><w:r><w:t>Fees</w:t><w:tab/><w:t>A &amp; B</w:t><w:br/><w:t>next</w:t></w:r></w:p>");
    assert_eq!(docx_text(&xml).unwrap(), "Fees\tA & B\nnext");
  }

  #[test]
  fn test_tables_flatten_row_by_row() {
    let xml = wrap(
      "<w:p><w:r><w:t>Schedule A</w:t></w:r></w:p>\
       <w:tbl>\
         <w:tr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Fee</w:t></w:r></w:p></w:tc></w:tr>\
         <w:tr><w:tc><w:p><w:r><w:t>Review</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>$500</w:t></w:r></w:p></w:tc></w:tr>\
       </w:tbl>\
       <w:p><w:r><w:t>Signed</w:t></w:r></w:p>",
    );
    assert_eq!(docx_text(&xml).unwrap(), "Schedule A\n\nItem\tFee\nReview\t$500\n\nSigned");
  }

  #[test]
  fn test_instruction_text_is_ignored() {
    let xml = wrap("<w:p><w:r><w:instrText>PAGE</w:instrText><w:t>Visible</w:t></w:r></w:p>");
    assert_eq!(docx_text(&xml).unwrap(), "Visible");
  }

  #[test]
  fn test_unsupported_extension() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("template.pdf");
    fs::write(&path, "x").unwrap();
    assert!(load_document(&path).is_err());
  }

  #[test]
  fn test_plain_text_template() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("template.txt");
    fs::write(&path, "1. Parties\nThe Company and the Consultant.").unwrap();
    let document = load_document(&path).unwrap();
    assert_eq!(document.source, path);
    assert!(document.text.starts_with("1. Parties"));
  }

  fn write_parts(path: &Path, parts: &[(&str, &str)]) {
    use std::io::Write;
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in parts {
      zip.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
      zip.write_all(wrap(body).as_bytes()).unwrap();
    }
    zip.finish().unwrap();
  }

  #[test]
  fn test_headers_and_footers_surround_body() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("template.docx");
    write_parts(
      &path,
      &[
        ("word/footer1.xml", "<w:p><w:r><w:t>Confidential</w:t></w:r></w:p>"),
        ("word/document.xml", "<w:p><w:r><w:t>1. Parties</w:t></w:r></w:p>"),
        ("word/header1.xml", "<w:p><w:r><w:t>ACME LETTERHEAD</w:t></w:r></w:p>"),
        ("word/header2.xml", "<w:p/>"),
      ],
    );

    let document = load_document(&path).unwrap();
    assert_eq!(document.text, "ACME LETTERHEAD\n\n1. Parties\n\nConfidential");
  }

  #[test]
  fn test_docx_without_document_part() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("template.docx");
    write_parts(&path, &[("word/header1.xml", "<w:p><w:r><w:t>Only a header</w:t></w:r></w:p>")]);
    assert!(load_document(&path).is_err());
  }
}
