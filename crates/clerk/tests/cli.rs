use assert_cmd::prelude::*;
use assert_fs::prelude::*;

use predicates::prelude::*;
use predicates::str::contains;
use std::process::Command;

/// `clerk` running inside `dir` with templates resolved against it
fn clerk_cmd(dir: &assert_fs::TempDir) -> Command {
  let mut cmd = Command::cargo_bin("clerk").expect("binary exists");
  cmd.current_dir(dir.path());
  cmd.env("CLERK_TEMPLATE_DIR", dir.path());
  cmd.env("NO_COLOR", "1");
  cmd.env_remove("CLERK_MODEL_DIR");
  cmd.env_remove("CLERK_CACHE_DIR");
  cmd.env_remove("CLERK_EMBEDDING_DIR");
  cmd
}

#[test]
fn test_categories_lists_templates() {
  let temp = assert_fs::TempDir::new().unwrap();
  temp.child("Consignment-Agreement-Template.docx").write_str("placeholder").unwrap();

  clerk_cmd(&temp)
    .arg("categories")
    .assert()
    .success()
    .stdout(
      contains("Consulting Contract")
        .and(contains("confidentiality"))
        .and(contains("consulting-contract-template-37.docx [missing]"))
        .and(contains("Consignment-Agreement-Template.docx [found]")),
    );

  temp.close().unwrap();
}

#[test]
fn test_prompt_without_retrieval() {
  let temp = assert_fs::TempDir::new().unwrap();

  clerk_cmd(&temp)
    .args([
      "prompt",
      "--category",
      "consulting",
      "--company",
      "Acme Ltd",
      "--party",
      "Jane Roe",
      "--role",
      "service-provider",
      "--start-date",
      "2025-01-01",
      "--jurisdiction",
      "Kenya",
      "--no-retrieval",
    ])
    .assert()
    .success()
    .stdout(
      contains("Write a complete and formal Consulting Contract in English legal language.")
        .and(contains("- Company: Acme Ltd"))
        .and(contains("- Role: Service Provider"))
        .and(contains("- Contract Period: 2025-01-01 to [End Date]"))
        .and(contains("- Governing Law: The laws of Kenya"))
        .and(contains("Standard contract template"))
        .and(contains("CONTRACT:")),
    );

  temp.close().unwrap();
}

#[test]
fn test_prompt_with_empty_corpus_needs_no_model() {
  let temp = assert_fs::TempDir::new().unwrap();

  clerk_cmd(&temp)
    .args(["prompt", "--category", "consignment", "--cache-dir", "no-such-cache"])
    .assert()
    .success()
    .stdout(contains("Standard contract template").and(contains("- Address: [Company Address]")));

  temp.close().unwrap();
}

#[test]
fn test_generate_without_model_fails_visibly() {
  let temp = assert_fs::TempDir::new().unwrap();

  clerk_cmd(&temp)
    .args(["generate", "--category", "confidentiality", "--model-dir", "missing-model"])
    .assert()
    .failure()
    .stderr(contains("Failed to load model from"));

  temp.child("generated_contract.txt").assert(predicate::path::missing());
  temp.close().unwrap();
}

#[test]
fn test_online_config_is_rejected() {
  let temp = assert_fs::TempDir::new().unwrap();
  temp.child("clerk.yaml").write_str("offline: false\n").unwrap();

  clerk_cmd(&temp)
    .args(["categories"])
    .assert()
    .failure()
    .stderr(contains("offline"));

  temp.close().unwrap();
}

#[test]
fn test_bad_date_is_a_usage_error() {
  let temp = assert_fs::TempDir::new().unwrap();

  clerk_cmd(&temp)
    .args(["prompt", "--category", "consulting", "--start-date", "2025-13-40", "--no-retrieval"])
    .assert()
    .failure()
    .stderr(contains("--start-date"));

  temp.close().unwrap();
}
