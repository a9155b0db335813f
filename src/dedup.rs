use crate::fingerprint::Fingerprint;
use std::collections::HashSet;

/// First-seen table for one subscription source. Create one per source and
/// drop it once that source's output has been written.
#[derive(Debug, Default)]
pub struct DedupTable {
  seen: HashSet<Fingerprint>,
  kept: Vec<String>,
  duplicates: usize,
}

impl DedupTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns true when the line is the first with this fingerprint.
  pub fn observe(&mut self, raw: &str, fp: Fingerprint) -> bool {
    if self.seen.insert(fp) {
      self.kept.push(raw.to_string());
      true
    } else {
      self.duplicates += 1;
      false
    }
  }

  pub fn kept(&self) -> &[String] {
    &self.kept
  }

  pub fn duplicates(&self) -> usize {
    self.duplicates
  }

  pub fn into_kept(self) -> Vec<String> {
    self.kept
  }
}

/// Feeds `(raw line, fingerprint)` pairs through the table and hands it back.
pub fn deduplicate<I>(mut table: DedupTable, pairs: I) -> DedupTable
where
  I: IntoIterator<Item = (String, Fingerprint)>,
{
  for (raw, fp) in pairs {
    table.observe(&raw, fp);
  }
  table
}
