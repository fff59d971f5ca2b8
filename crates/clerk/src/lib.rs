//! Contract drafting grounded in a local template corpus
//!
//! Templates for the chosen [`category::ContractCategory`] are read from disk,
//! split into overlapping chunks and embedded; the passages closest to the
//! category query are folded into a fixed prompt, and a local causal language
//! model writes the contract after the [`prompt::DELIMITER`].

pub mod category;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generator;
pub mod index;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod sampling;

pub use category::{ContractCategory, PartyRole};
pub use config::Config;
pub use error::ClerkError;
pub use pipeline::{spawn_generation, ContractWriter, GeneratedContract, MockBackend, ModelBackend, OnnxBackend};
pub use prompt::ContractFields;
