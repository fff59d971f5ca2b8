use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of contract to draft. Selects the template set and the retrieval query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ContractCategory {
  #[value(name = "consulting")]
  ConsultingContract,
  #[value(name = "confidentiality")]
  ConfidentialityAgreement,
  #[value(name = "consignment")]
  ConsignmentAgreement,
}

impl ContractCategory {
  pub const ALL: [ContractCategory; 3] = [
    ContractCategory::ConsultingContract,
    ContractCategory::ConfidentialityAgreement,
    ContractCategory::ConsignmentAgreement,
  ];

  pub fn title(&self) -> &'static str {
    match self {
      Self::ConsultingContract => "Consulting Contract",
      Self::ConfidentialityAgreement => "Confidentiality Agreement",
      Self::ConsignmentAgreement => "Consignment Agreement",
    }
  }

  /// Template file names, in load order, relative to the template directory
  pub fn template_files(&self) -> &'static [&'static str] {
    match self {
      Self::ConsultingContract => &[
        "consulting-contract-template-37.docx",
        "consulting-contract-template-38.docx",
        "consulting-contract-template-41.docx",
        "consulting-contract-template-42.docx",
        "consulting-contract-template-43.docx",
        "consulting-contract-template-44.docx",
      ],
      Self::ConfidentialityAgreement => &[
        "confidentiality-statement-01.docx",
        "confidentiality-statement-02.docx",
        "confidentiality-statement-03.docx",
        "confidentiality-statement-04.docx",
        "confidentiality-statement-05.docx",
      ],
      Self::ConsignmentAgreement => &["Consignment-Agreement-Template.docx"],
    }
  }

  pub fn retrieval_query(&self) -> String {
    format!("{} agreement template clauses terms", self.title())
  }
}

impl fmt::Display for ContractCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.title())
  }
}

/// Role of the second party
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartyRole {
  #[default]
  Consultant,
  IndependentContractor,
  Employee,
  ServiceProvider,
  Other(String),
}

/// Role choices as offered on the command line; `other` takes its text separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RoleChoice {
  #[default]
  Consultant,
  IndependentContractor,
  Employee,
  ServiceProvider,
  Other,
}

impl PartyRole {
  pub fn from_choice(choice: RoleChoice, other: Option<&str>) -> Self {
    match choice {
      RoleChoice::Consultant => Self::Consultant,
      RoleChoice::IndependentContractor => Self::IndependentContractor,
      RoleChoice::Employee => Self::Employee,
      RoleChoice::ServiceProvider => Self::ServiceProvider,
      RoleChoice::Other => Self::Other(other.unwrap_or_default().trim().to_string()),
    }
  }
}

impl fmt::Display for PartyRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Consultant => f.write_str("Consultant"),
      Self::IndependentContractor => f.write_str("Independent Contractor"),
      Self::Employee => f.write_str("Employee"),
      Self::ServiceProvider => f.write_str("Service Provider"),
      Self::Other(role) => f.write_str(role),
    }
  }
}
