use crate::model::{NormalizedConfig, ParsedConfig, ProtocolDefaults};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Presentation-only metadata. Matched case-insensitively at every depth.
pub const NOISE_FIELDS: &[&str] = &[
  "remarks",
  "remark",
  "ps",
  "comment",
  "comments",
  "timestamp",
  "timestamps",
  "updated",
  "updated_at",
  "tag",
  "tags",
  "sub",
  "subscription",
  "group",
  "groups",
  "name",
];

pub fn is_noise_field(key: &str) -> bool {
  let k = key.trim().to_lowercase();
  NOISE_FIELDS.contains(&k.as_str())
}

fn is_empty_value(v: &Value) -> bool {
  match v {
    Value::Null => true,
    Value::String(s) => s.trim().is_empty(),
    Value::Array(a) => a.is_empty(),
    Value::Object(m) => m.is_empty(),
    _ => false,
  }
}

fn canonical_string(s: &str) -> String {
  match Uuid::parse_str(s.trim()) {
    Ok(id) => id.hyphenated().to_string(),
    Err(_) => s.to_string(),
  }
}

fn canonical_value(v: &Value) -> Value {
  match v {
    Value::Object(m) => Value::Object(canonical_map(m)),
    Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
    Value::String(s) => Value::String(canonical_string(s)),
    other => other.clone(),
  }
}

/// Lower-cases keys, drops noise and empty entries, canonicalizes UUID
/// strings. When two keys fold to the same name the already-lowercase one
/// wins, otherwise the first in iteration order.
pub fn canonical_map(m: &Map<String, Value>) -> Map<String, Value> {
  let mut out = Map::new();
  for (k, v) in m {
    let key = k.trim().to_lowercase();
    if key.is_empty() || is_noise_field(&key) {
      continue;
    }
    let value = canonical_value(v);
    if is_empty_value(&value) {
      continue;
    }
    if out.contains_key(&key) && *k != key {
      continue;
    }
    out.insert(key, value);
  }
  out
}

fn sort_keys(v: Value) -> Value {
  match v {
    Value::Object(m) => Value::Object(sort_map(m)),
    Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
    other => other,
  }
}

fn sort_map(m: Map<String, Value>) -> Map<String, Value> {
  let mut entries: Vec<(String, Value)> = m.into_iter().collect();
  entries.sort_by(|a, b| a.0.cmp(&b.0));
  entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect()
}

pub fn normalize(cfg: &ParsedConfig, defaults: &ProtocolDefaults) -> NormalizedConfig {
  let protocol = cfg.protocol.trim().to_lowercase();
  let mut fields = canonical_map(&cfg.fields);
  if let Some(backfill) = defaults.for_protocol(&protocol) {
    for (k, v) in backfill {
      fields.entry(k.clone()).or_insert_with(|| v.clone());
    }
  }
  NormalizedConfig {
    protocol,
    fields: sort_map(fields),
  }
}
