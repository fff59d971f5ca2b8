use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clerk::category::RoleChoice;
use clerk::output::{write_contract, DEFAULT_OUTPUT_FILE};
use clerk::{spawn_generation, Config, ContractCategory, ContractFields, ContractWriter, PartyRole};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "clerk")]
#[command(about = "Clerk - Contract Generator\nDrafts contracts from local templates with a local language model")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), ", courtesy of Kernelle Software"))]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Command,
}

#[derive(Args)]
struct GlobalArgs {
  /// YAML configuration file (defaults to ./clerk.yaml when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,
  /// Show debug output
  #[arg(short, long, global = true)]
  verbose: bool,
  /// Directory holding the template files
  #[arg(long, global = true)]
  template_dir: Option<PathBuf>,
  /// Language model directory
  #[arg(long, global = true)]
  model_dir: Option<PathBuf>,
  /// Hugging Face cache holding the embedding model
  #[arg(long, global = true)]
  cache_dir: Option<PathBuf>,
  /// Seed for reproducible sampling
  #[arg(long, global = true)]
  seed: Option<u64>,
}

/// Contract details shared by `generate` and `prompt`
#[derive(Args)]
struct RequestArgs {
  /// Kind of contract to draft
  #[arg(short, long, value_enum)]
  category: ContractCategory,
  /// Company name
  #[arg(long, default_value = "")]
  company: String,
  /// Company address
  #[arg(long, default_value = "")]
  address: String,
  /// Name of the second party
  #[arg(long, default_value = "")]
  party: String,
  /// Role of the second party
  #[arg(long, value_enum, default_value_t = RoleChoice::Consultant)]
  role: RoleChoice,
  /// Role text when --role is `other`
  #[arg(long)]
  role_other: Option<String>,
  /// Contract start date (YYYY-MM-DD)
  #[arg(long)]
  start_date: Option<NaiveDate>,
  /// Contract end date (YYYY-MM-DD)
  #[arg(long)]
  end_date: Option<NaiveDate>,
  /// Country or state whose law governs the contract
  #[arg(long, default_value = "")]
  jurisdiction: String,
  /// Contract value
  #[arg(long, default_value = "")]
  value: String,
  /// Payment terms
  #[arg(long, default_value = "")]
  payment_terms: String,
  /// Special termination clause
  #[arg(long, default_value = "")]
  termination: String,
}

#[derive(Subcommand)]
enum Command {
  /// Draft a contract and save it to a file
  Generate {
    #[command(flatten)]
    request: RequestArgs,
    /// Where to save the contract
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,
    /// Also print the contract to stdout
    #[arg(short, long)]
    print: bool,
  },
  /// Print the prompt the language model would receive
  Prompt {
    #[command(flatten)]
    request: RequestArgs,
    /// Skip template retrieval and use the standard reference
    #[arg(long)]
    no_retrieval: bool,
  },
  /// List contract categories and their template files
  Categories,
}

impl RequestArgs {
  fn fields(&self) -> ContractFields {
    ContractFields {
      company: self.company.clone(),
      company_address: self.address.clone(),
      party_name: self.party.clone(),
      party_role: PartyRole::from_choice(self.role, self.role_other.as_deref()),
      start_date: self.start_date,
      end_date: self.end_date,
      jurisdiction: self.jurisdiction.clone(),
      contract_value: self.value.clone(),
      payment_terms: self.payment_terms.clone(),
      termination_clause: self.termination.clone(),
    }
  }
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  herald::init(cli.global.verbose);

  if let Err(e) = run(cli).await {
    herald::error!(&format!("{e:#}"));
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = load_config(&cli.global)?;

  match cli.command {
    Command::Generate { request, output, print } => generate(config, &request, &output, print).await,
    Command::Prompt { request, no_retrieval } => {
      let fields = checked_fields(&request);
      let writer = ContractWriter::onnx(config);
      let prompt = writer.build_prompt(request.category, &fields, !no_retrieval)?;
      println!("{prompt}");
      Ok(())
    }
    Command::Categories => {
      list_categories(&config);
      Ok(())
    }
  }
}

fn load_config(global: &GlobalArgs) -> Result<Config> {
  let mut config = Config::load(global.config.as_deref())?;

  if let Some(dir) = &global.template_dir {
    config.template_dir = dir.clone();
  }
  if let Some(dir) = &global.model_dir {
    config.model_dir = dir.clone();
  }
  if let Some(dir) = &global.cache_dir {
    config.cache_dir = dir.clone();
  }
  if global.seed.is_some() {
    config.seed = global.seed;
  }

  config.validate()?;
  Ok(config)
}

fn checked_fields(request: &RequestArgs) -> ContractFields {
  let fields = request.fields();
  for field in fields.missing_required() {
    herald::warn!(&format!("No {field} given; the draft will leave it for the model to fill"));
  }
  if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
    if end < start {
      herald::warn!(&format!("End date {end} is before start date {start}"));
    }
  }
  fields
}

async fn generate(config: Config, request: &RequestArgs, output: &Path, print: bool) -> Result<()> {
  let fields = checked_fields(request);
  let category = request.category;

  herald::announce(&format!("Drafting {category}"));
  let started = Instant::now();
  let mut handle = spawn_generation(ContractWriter::onnx(config), category, fields);

  let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
  ticker.tick().await;
  let contract = loop {
    tokio::select! {
      joined = &mut handle => break joined.context("Generation task stopped unexpectedly")??,
      _ = ticker.tick() => {
        herald::info!(&format!("Still generating... {}s elapsed", started.elapsed().as_secs()));
      }
    }
  };

  if !contract.delimiter_found {
    herald::warn!("Model output had no contract marker; saving the raw output");
  }

  write_contract(output, &contract.text)?;
  herald::success!(&format!("Contract saved to {} in {:.1}s", output.display(), started.elapsed().as_secs_f32()));
  eprintln!("{}", herald::label("Templates used", &contract.reference.documents.to_string()));
  eprintln!("{}", herald::label("Passages retrieved", &contract.reference.retrieved.to_string()));

  if print {
    println!("{}", contract.text);
  }
  Ok(())
}

fn list_categories(config: &Config) {
  for category in ContractCategory::ALL {
    let name = category.to_possible_value().map(|v| v.get_name().to_string()).unwrap_or_default();
    println!("{} ({})", category.title().bold(), name.cyan());
    for file in category.template_files() {
      let marker = if config.template_path(file).is_file() { "found".green() } else { "missing".yellow() };
      println!("  {file} [{marker}]");
    }
  }
}
