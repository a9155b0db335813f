use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use std::path::PathBuf;
use subdedup::dedup::DedupTable;
use subdedup::pipeline::{process_lines, ProcessedLink};
use subdedup::source::load_defaults;
use tokio::io::{AsyncReadExt, BufReader};

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// Read subscription text from stdin.
  #[arg(long, default_value_t = false)]
  pub stdin: bool,

  /// Subscription text provided directly as an argument. Prefer --stdin for large inputs.
  #[arg(long)]
  pub text: Option<String>,

  /// YAML file with per-protocol field defaults.
  #[arg(long)]
  pub defaults: Option<PathBuf>,

  /// Also print duplicates, flagged with "duplicate": true.
  #[arg(long, default_value_t = false)]
  pub all: bool,
}

#[derive(Serialize)]
struct LineOut<'a> {
  #[serde(flatten)]
  link: &'a ProcessedLink,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  duplicate: bool,
}

pub async fn run(args: Args) -> Result<()> {
  let input = if args.stdin || args.text.is_none() {
    let mut buf = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    stdin.read_to_string(&mut buf).await?;
    buf
  } else {
    args.text.clone().unwrap_or_default()
  };

  let defaults = load_defaults(args.defaults.as_deref());
  let (links, _, _) = process_lines("input", &input, &defaults);
  let mut table = DedupTable::new();
  for link in &links {
    let first = table.observe(&link.raw, link.fingerprint.clone());
    if !first && !args.all {
      continue;
    }
    let out = LineOut {
      link,
      duplicate: !first,
    };
    println!("{}", serde_json::to_string(&out)?);
  }
  Ok(())
}
