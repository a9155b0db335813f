use crate::decode::decode_payload;
use crate::dedup::{deduplicate, DedupTable};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::model::{NormalizedConfig, ProtocolDefaults};
use crate::normalize::normalize;
use crate::parse::{parse_link, ParseError};
use log::{debug, info, warn};
use serde::Serialize;

/// One line that made it through parse, normalize and fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedLink {
  pub fingerprint: Fingerprint,
  pub protocol: String,
  pub config: NormalizedConfig,
  pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
  pub lines: usize,
  pub parsed: usize,
  pub failed: usize,
  pub duplicates: usize,
  pub kept: Vec<String>,
}

pub fn preview(line: &str) -> String {
  const MAX: usize = 80;
  if line.chars().count() <= MAX {
    return line.to_string();
  }
  let cut: String = line.chars().take(MAX).collect();
  format!("{cut}...")
}

pub fn process_line(line: &str, defaults: &ProtocolDefaults) -> Result<ProcessedLink, ParseError> {
  let parsed = parse_link(line)?;
  let config = normalize(&parsed, defaults);
  Ok(ProcessedLink {
    fingerprint: fingerprint(&config),
    protocol: config.protocol.clone(),
    config,
    raw: line.to_string(),
  })
}

/// Every successfully processed line of a payload, in input order, duplicates
/// included. Failures are logged and skipped.
pub fn process_lines(
  source: &str,
  payload: &str,
  defaults: &ProtocolDefaults,
) -> (Vec<ProcessedLink>, usize, usize) {
  let decoded = decode_payload(payload);
  debug!(
    "{source}: payload decoded as {}",
    if decoded.was_base64() { "base64" } else { "plaintext" }
  );
  let mut out = Vec::new();
  let mut lines = 0usize;
  let mut failed = 0usize;
  for line in decoded.lines() {
    lines += 1;
    match process_line(line, defaults) {
      Ok(link) => out.push(link),
      Err(e) => {
        failed += 1;
        warn!("{source}: skipping line {lines} ({e}): {}", preview(line));
      }
    }
  }
  (out, lines, failed)
}

/// Runs one subscription payload through the whole pipeline with a fresh
/// `DedupTable`.
pub fn process_payload(source: &str, payload: &str, defaults: &ProtocolDefaults) -> SourceReport {
  let (links, lines, failed) = process_lines(source, payload, defaults);
  let parsed = links.len();
  let table = deduplicate(
    DedupTable::new(),
    links.into_iter().map(|l| (l.raw, l.fingerprint)),
  );
  let duplicates = table.duplicates();
  let kept = table.into_kept();
  info!(
    "{source}: {lines} lines, {parsed} parsed, {failed} failed, {duplicates} duplicates, {} kept",
    kept.len()
  );
  SourceReport {
    lines,
    parsed,
    failed,
    duplicates,
    kept,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use base64::engine::general_purpose;
  use base64::Engine;

  #[test]
  fn ss_scenario() {
    let link = process_line(
      "ss://YWVzLTI1Ni1nY206cGFzcw==@1.2.3.4:8388#test",
      &ProtocolDefaults::empty(),
    )
    .unwrap();
    assert_eq!(link.protocol, "ss");
    assert_eq!(
      serde_json::Value::Object(link.config.fields.clone()),
      serde_json::json!({"method": "aes-256-gcm", "password": "pass", "server": "1.2.3.4", "port": 8388})
    );
  }

  #[test]
  fn bad_lines_do_not_abort_the_batch() {
    let payload = "foo://bar\nvless://u@h:443#a\nnot a link\nvless://u@h:443#b\ntrojan://p@t:443\n";
    let report = process_payload("test", payload, &ProtocolDefaults::empty());
    assert_eq!(report.lines, 5);
    assert_eq!(report.failed, 2);
    assert_eq!(report.parsed, 3);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.kept, vec!["vless://u@h:443#a", "trojan://p@t:443"]);
  }

  #[test]
  fn base64_feed() {
    let feed = general_purpose::STANDARD.encode("trojan://p@t:443#x\ntrojan://p@t:443#y\n");
    let report = process_payload("b64", &feed, &ProtocolDefaults::empty());
    assert_eq!(report.kept, vec!["trojan://p@t:443#x"]);
  }

  #[test]
  fn preview_truncates_on_char_boundary() {
    let long = "é".repeat(100);
    let p = preview(&long);
    assert!(p.ends_with("..."));
    assert_eq!(p.chars().count(), 83);
  }
}
