use herald::*;

#[test]
fn test_logging_functions_without_subscriber() {
  info("info message");
  warn("warning message");
  error("error message");
  verbose("verbose message");
  success("success message");
}

#[test]
fn test_macros_accept_formatted_strings() {
  let count = 3;
  herald::info!(&format!("loaded {count} templates"));
  herald::verbose!(&format!("chunk {} of {}", 1, count));
  herald::success!("done");
}

#[test]
fn test_multiline_messages() {
  let multiline = "First line\nSecond line\nThird line";
  info(multiline);
  warn(multiline);
}

#[test]
fn test_init_is_idempotent() {
  init(false);
  init(true);
  info("after init");
}

#[test]
fn test_filter_defaults() {
  std::env::remove_var(LOG_ENV);
  let quiet = filter(false).to_string();
  let loud = filter(true).to_string();
  assert!(quiet.contains("clerk=info"));
  assert!(loud.contains("clerk=debug"));
}
