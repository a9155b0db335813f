use anyhow::{anyhow, Context, Result};
use clap::Args as ClapArgs;
use log::{error, info};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subdedup::model::ProtocolDefaults;
use subdedup::pipeline::{process_payload, SourceReport};
use subdedup::source::{
  build_client, default_user_agent, emit_result, load_defaults, load_source, parse_source_list,
  source_id, FetchOptions,
};
use tokio::sync::Semaphore;

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// File listing subscription sources, one URL or local path per line.
  #[arg(long)]
  pub input: PathBuf,

  /// YAML file with per-protocol field defaults. Missing/invalid means no defaults.
  #[arg(long)]
  pub defaults: Option<PathBuf>,

  /// Directory receiving one deduplicated file per source.
  #[arg(long)]
  pub output_dir: PathBuf,

  /// Fetch attempts per remote source.
  #[arg(long, default_value_t = 3)]
  pub retries: usize,

  /// Pause between fetch attempts (ms).
  #[arg(long, default_value_t = 2_000)]
  pub retry_delay_ms: u64,

  /// Request timeout (ms).
  #[arg(long, default_value_t = 10_000)]
  pub timeout_ms: u64,

  /// Sources processed at the same time.
  #[arg(long, default_value_t = 4)]
  pub concurrency: usize,

  /// User-Agent header.
  #[arg(long)]
  pub user_agent: Option<String>,
}

async fn run_source(
  source: String,
  client: Client,
  opts: FetchOptions,
  defaults: Arc<ProtocolDefaults>,
  output_dir: PathBuf,
) -> Result<(PathBuf, SourceReport)> {
  let payload = load_source(&client, &source, &opts)
    .await
    .with_context(|| format!("source {source} skipped"))?;
  let report = process_payload(&source, &payload, &defaults);
  let path = emit_result(&output_dir, &source_id(&source), &report.kept).await?;
  Ok((path, report))
}

pub async fn run(args: Args) -> Result<()> {
  let list = tokio::fs::read_to_string(&args.input)
    .await
    .with_context(|| format!("read source list {}", args.input.display()))?;
  let sources = parse_source_list(&list);
  if sources.is_empty() {
    return Err(anyhow!("no subscription sources in {}", args.input.display()));
  }

  let defaults = Arc::new(load_defaults(args.defaults.as_deref()));
  info!(
    "{} sources, defaults for {} protocols",
    sources.len(),
    defaults.len()
  );

  let opts = FetchOptions {
    retries: args.retries.max(1),
    retry_delay: Duration::from_millis(args.retry_delay_ms),
    timeout: Duration::from_millis(args.timeout_ms),
    user_agent: args
      .user_agent
      .clone()
      .unwrap_or_else(|| default_user_agent().to_string()),
  };
  let client = build_client(&opts)?;

  let sem = Arc::new(Semaphore::new(args.concurrency.max(1)));
  let mut handles = Vec::with_capacity(sources.len());
  for source in sources {
    let sem = sem.clone();
    let client = client.clone();
    let opts = opts.clone();
    let defaults = defaults.clone();
    let output_dir = args.output_dir.clone();
    handles.push(tokio::spawn(async move {
      let _permit = sem
        .acquire_owned()
        .await
        .map_err(|e| anyhow!("semaphore closed: {e}"))?;
      run_source(source, client, opts, defaults, output_dir).await
    }));
  }

  let total = handles.len();
  let mut written = 0usize;
  for h in handles {
    match h.await {
      Ok(Ok((path, report))) => {
        written += 1;
        info!("wrote {} lines to {}", report.kept.len(), path.display());
      }
      Ok(Err(e)) => error!("{e:#}"),
      Err(e) => error!("source task failed: {e}"),
    }
  }
  info!("{written}/{total} sources written to {}", args.output_dir.display());
  Ok(())
}
