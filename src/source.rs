use crate::model::ProtocolDefaults;
use anyhow::{Context, Result};
use log::{error, warn};
use reqwest::Client;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("http status {0}")]
  Status(u16),
  #[error("transport: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("gave up after {attempts} attempts: {last}")]
  Exhausted { attempts: usize, last: String },
}

#[derive(Debug, Error)]
pub enum DefaultsError {
  #[error("read defaults: {0}")]
  Io(#[from] std::io::Error),
  #[error("parse defaults yaml: {0}")]
  Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub retries: usize,
  pub retry_delay: Duration,
  pub timeout: Duration,
  pub user_agent: String,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      retries: 3,
      retry_delay: Duration::from_millis(2_000),
      timeout: Duration::from_millis(10_000),
      user_agent: default_user_agent().to_string(),
    }
  }
}

pub fn default_user_agent() -> &'static str {
  concat!("subdedup/", env!("CARGO_PKG_VERSION"))
}

pub fn build_client(opts: &FetchOptions) -> Result<Client> {
  let client = Client::builder()
    .user_agent(opts.user_agent.as_str())
    .redirect(reqwest::redirect::Policy::limited(10))
    .timeout(opts.timeout.max(Duration::from_millis(1)))
    .build()
    .context("build http client")?;
  Ok(client)
}

pub fn is_remote(source: &str) -> bool {
  let s = source.trim().to_lowercase();
  s.starts_with("http://") || s.starts_with("https://")
}

async fn fetch_once(client: &Client, url: &str) -> Result<String, FetchError> {
  let res = client.get(url).send().await?;
  let status = res.status();
  if !status.is_success() {
    return Err(FetchError::Status(status.as_u16()));
  }
  Ok(res.text().await?)
}

/// GET with a fixed retry budget and a fixed pause between attempts.
pub async fn fetch(client: &Client, url: &str, opts: &FetchOptions) -> Result<String, FetchError> {
  let attempts = opts.retries.max(1);
  let mut last = String::new();
  for attempt in 1..=attempts {
    match fetch_once(client, url).await {
      Ok(body) => return Ok(body),
      Err(e) => {
        warn!("attempt {attempt}/{attempts} failed for {url}: {e}");
        last = e.to_string();
      }
    }
    if attempt < attempts && !opts.retry_delay.is_zero() {
      sleep(opts.retry_delay).await;
    }
  }
  error!("giving up on {url} after {attempts} attempts");
  Err(FetchError::Exhausted { attempts, last })
}

/// Remote sources are fetched, anything else is read as a local file.
pub async fn load_source(
  client: &Client,
  source: &str,
  opts: &FetchOptions,
) -> Result<String, FetchError> {
  if is_remote(source) {
    return fetch(client, source, opts).await;
  }
  tokio::fs::read_to_string(source)
    .await
    .map_err(|e| FetchError::Io {
      path: source.to_string(),
      source: e,
    })
}

/// One source per line; blank lines and `#` comments skipped, repeats
/// collapsed keeping first order.
pub fn parse_source_list(text: &str) -> Vec<String> {
  let mut seen = HashSet::new();
  text
    .lines()
    .map(|l| l.trim())
    .filter(|l| !l.is_empty() && !l.starts_with('#'))
    .filter(|l| seen.insert(l.to_string()))
    .map(|l| l.to_string())
    .collect()
}

pub fn read_defaults(path: &Path) -> Result<ProtocolDefaults, DefaultsError> {
  let text = std::fs::read_to_string(path)?;
  parse_defaults(&text)
}

pub fn parse_defaults(text: &str) -> Result<ProtocolDefaults, DefaultsError> {
  if text.trim().is_empty() {
    return Ok(ProtocolDefaults::empty());
  }
  let raw: Option<HashMap<String, Option<Map<String, Value>>>> = serde_yaml::from_str(text)?;
  let raw = raw
    .unwrap_or_default()
    .into_iter()
    .map(|(k, v)| (k, v.unwrap_or_default()))
    .collect();
  Ok(ProtocolDefaults::new(raw))
}

/// Missing or invalid defaults degrade to an empty table.
pub fn load_defaults(path: Option<&Path>) -> ProtocolDefaults {
  let Some(path) = path else {
    return ProtocolDefaults::empty();
  };
  match read_defaults(path) {
    Ok(d) => d,
    Err(e) => {
      warn!("{}: {e}; continuing without protocol defaults", path.display());
      ProtocolDefaults::empty()
    }
  }
}

/// Stable, filesystem-safe name for a source's output artifact.
pub fn source_id(source: &str) -> String {
  const MAX: usize = 64;
  let mut slug: String = source
    .trim()
    .trim_start_matches("https://")
    .trim_start_matches("http://")
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
    .collect();
  slug = slug.trim_matches('_').to_string();
  slug.truncate(MAX);
  if slug.is_empty() {
    slug.push_str("source");
  }
  let mut hasher = Sha256::new();
  hasher.update(source.trim().as_bytes());
  let digest = format!("{:x}", hasher.finalize());
  format!("{slug}-{}", &digest[..8])
}

/// Writes one kept line per row, newline-terminated, replacing any previous file.
pub async fn emit_result(dir: &Path, id: &str, lines: &[String]) -> Result<PathBuf> {
  tokio::fs::create_dir_all(dir)
    .await
    .with_context(|| format!("create output dir {}", dir.display()))?;
  let path = dir.join(format!("{id}.txt"));
  let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
  for line in lines {
    body.push_str(line);
    body.push('\n');
  }
  tokio::fs::write(&path, body)
    .await
    .with_context(|| format!("write {}", path.display()))?;
  Ok(path)
}
