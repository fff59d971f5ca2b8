//! Prompt assembly
//!
//! Pure string building: the same category, fields and reference text always
//! give the same prompt. Empty optional fields are replaced by fixed
//! placeholder phrases, the retrieved reference text is cut to a character
//! limit, and the prompt closes with [`DELIMITER`], after which the model is
//! expected to write the contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::category::{ContractCategory, PartyRole};

/// Marks where the contract body starts in model output
pub const DELIMITER: &str = "CONTRACT:";

/// Reference text used when no template passage was retrieved
pub const FALLBACK_REFERENCE: &str = "Standard contract template";

pub const DEFAULT_REFERENCE_LIMIT: usize = 1200;

pub const ADDRESS_PLACEHOLDER: &str = "[Company Address]";
pub const JURISDICTION_PLACEHOLDER: &str = "The laws of [Specify Country/State]";
pub const VALUE_PLACEHOLDER: &str = "As specified in Schedule A";
pub const PAYMENT_TERMS_PLACEHOLDER: &str = "As agreed between parties";
pub const TERMINATION_PLACEHOLDER: &str = "Standard termination applies";
pub const START_DATE_PLACEHOLDER: &str = "[Start Date]";
pub const END_DATE_PLACEHOLDER: &str = "[End Date]";
pub const ROLE_PLACEHOLDER: &str = "[Specify Role]";

pub const REQUIRED_SECTIONS: [&str; 10] = [
  "Parties",
  "Purpose",
  "Scope of Services",
  "Compensation",
  "Confidentiality",
  "Intellectual Property",
  "Termination",
  "Liability",
  "Governing Law",
  "Signatures",
];

const REFERENCE_HEADER: &str =
  "Reference excerpts (for style/clauses guidance only; do not copy verbatim):";

/// User-supplied contract details. Company and second party name are not
/// validated; everything else falls back to a placeholder when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractFields {
  pub company: String,
  pub company_address: String,
  pub party_name: String,
  pub party_role: PartyRole,
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  /// Country or state whose law governs the contract
  pub jurisdiction: String,
  pub contract_value: String,
  pub payment_terms: String,
  pub termination_clause: String,
}

impl ContractFields {
  pub fn address_line(&self) -> &str {
    or_placeholder(&self.company_address, ADDRESS_PLACEHOLDER)
  }

  pub fn governing_law(&self) -> String {
    match self.jurisdiction.trim() {
      "" => JURISDICTION_PLACEHOLDER.to_string(),
      country => format!("The laws of {country}"),
    }
  }

  pub fn role_line(&self) -> String {
    match &self.party_role {
      PartyRole::Other(role) if role.trim().is_empty() => ROLE_PLACEHOLDER.to_string(),
      role => role.to_string(),
    }
  }

  pub fn period_line(&self) -> String {
    let start = self.start_date.map(|d| d.to_string()).unwrap_or_else(|| START_DATE_PLACEHOLDER.to_string());
    let end = self.end_date.map(|d| d.to_string()).unwrap_or_else(|| END_DATE_PLACEHOLDER.to_string());
    format!("{start} to {end}")
  }

  pub fn value_line(&self) -> &str {
    or_placeholder(&self.contract_value, VALUE_PLACEHOLDER)
  }

  pub fn payment_terms_line(&self) -> &str {
    or_placeholder(&self.payment_terms, PAYMENT_TERMS_PLACEHOLDER)
  }

  pub fn termination_line(&self) -> &str {
    or_placeholder(&self.termination_clause, TERMINATION_PLACEHOLDER)
  }

  /// Names of required fields left empty
  pub fn missing_required(&self) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if self.company.trim().is_empty() {
      missing.push("company");
    }
    if self.party_name.trim().is_empty() {
      missing.push("second party name");
    }
    missing
  }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
  match value.trim() {
    "" => placeholder,
    _ => value,
  }
}

/// Header plus the first `limit` characters of the reference text, trimmed.
/// Missing or blank reference text becomes [`FALLBACK_REFERENCE`].
pub fn reference_block(reference: Option<&str>, limit: usize) -> String {
  let text = match reference {
    Some(text) if !text.trim().is_empty() => text,
    _ => FALLBACK_REFERENCE,
  };
  let excerpt: String = text.chars().take(limit).collect();
  format!("{REFERENCE_HEADER}\n{excerpt}").trim().to_string()
}

/// Build the generation prompt
pub fn assemble_prompt(
  category: ContractCategory,
  fields: &ContractFields,
  reference: Option<&str>,
  reference_limit: usize,
) -> String {
  let sections = REQUIRED_SECTIONS
    .iter()
    .enumerate()
    .map(|(i, section)| format!("{}. {section}", i + 1))
    .collect::<Vec<_>>()
    .join("\n");

  format!(
    "
Write a complete and formal {category} in English legal language.
The contract must be well-structured, numbered, and professional.

Insert the provided details directly into the contract:

- Company: {company}
- Address: {address}
- Second Party: {party}
- Role: {role}
- Contract Period: {period}
- Governing Law: {law}
- Contract Value: {value}
- Payment Terms: {payment}
- Special Termination: {termination}

Use the following reference excerpts from uploaded templates to guide structure, clause wording, and style (do not copy verbatim; adapt to fit the details above):

{reference}

The contract MUST contain the following sections, in order:

{sections}

Ensure all sections are written in clear and formal contract language.
Do not leave placeholder text like [Insert here]. Write full clauses.
{DELIMITER}
",
    category = category.title(),
    company = fields.company,
    address = fields.address_line(),
    party = fields.party_name,
    role = fields.role_line(),
    period = fields.period_line(),
    law = fields.governing_law(),
    value = fields.value_line(),
    payment = fields.payment_terms_line(),
    termination = fields.termination_line(),
    reference = reference_block(reference, reference_limit),
  )
}
