//! Herald - logging facade for the clerk tools
//!
//! Messages are emitted as `tracing` events so a single subscriber decides what
//! reaches the terminal. Call sites use the macros, which take a `&str` the same
//! way everywhere:
//!
//! ```ignore
//! herald::info!(&format!("loaded {count} templates"));
//! ```
//!
//! Presentation helpers (`announce`, `label`, `banner_line`) write straight to
//! stderr and are meant for the binary, not for library code.

use colored::*;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Environment variable that overrides the default filter
pub const LOG_ENV: &str = "CLERK_LOG";

const QUIET_FILTER: &str = "clerk=info,herald=info,ort=warn,warn";
const VERBOSE_FILTER: &str = "clerk=debug,herald=debug,ort=warn,info";

/// Build the filter used by [`init`].
///
/// `CLERK_LOG` wins when it is set and parses; otherwise the verbosity flag
/// picks between the quiet and verbose defaults.
pub fn filter(verbose: bool) -> EnvFilter {
  if let Ok(directives) = std::env::var(LOG_ENV) {
    if let Ok(filter) = EnvFilter::try_new(&directives) {
      return filter;
    }
  }

  EnvFilter::new(if verbose { VERBOSE_FILTER } else { QUIET_FILTER })
}

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init(verbose: bool) {
  let layer = fmt::layer().with_writer(std::io::stderr).with_target(false).without_time();
  let _ = tracing_subscriber::registry().with(layer).with(filter(verbose)).try_init();
}

pub fn verbose(message: &str) {
  for line in message.lines() {
    tracing::debug!(target: "clerk", "{line}");
  }
}

pub fn info(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "clerk", "{line}");
  }
}

pub fn warn(message: &str) {
  for line in message.lines() {
    tracing::warn!(target: "clerk", "{line}");
  }
}

pub fn error(message: &str) {
  for line in message.lines() {
    tracing::error!(target: "clerk", "{line}");
  }
}

/// Info-level event tagged as a completed step
pub fn success(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "clerk", outcome = "success", "{line}");
  }
}

/// Create a banner line of the specified length and character
pub fn banner_line(length: usize, char: char) -> String {
  char.to_string().repeat(length)
}

/// Render a banner: border, message, border
pub fn as_banner(message: &str, width: usize, border_char: char) -> String {
  let border = banner_line(width, border_char);
  format!("{border}\n{message}\n{border}")
}

/// Print a titled banner to stderr
pub fn announce(message: &str) {
  eprintln!("{}", as_banner(message, 50, '-').blue().bold());
}

/// Bold key with a plain value, for summaries printed by the binary
pub fn label(key: &str, value: &str) -> String {
  format!("{} {}", format!("{key}:").bold(), value)
}

#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg)
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg)
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg)
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg)
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg)
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_banner_line() {
    assert_eq!(banner_line(5, '='), "=====");
    assert_eq!(banner_line(0, '-'), "");
  }

  #[test]
  fn test_as_banner_wraps_message() {
    let banner = as_banner("Generated Contract", 4, '~');
    let lines: Vec<&str> = banner.lines().collect();
    assert_eq!(lines, vec!["~~~~", "Generated Contract", "~~~~"]);
  }

  #[test]
  fn test_label_contains_key_and_value() {
    colored::control::set_override(false);
    assert_eq!(label("Category", "Consulting Contract"), "Category: Consulting Contract");
  }
}
