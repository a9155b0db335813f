use crate::model::{NormalizedConfig, Protocol};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 of the identity projection. This is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

const V2RAY_TRANSPORTS_WITH_HOST: &[&str] = &["ws", "grpc", "http"];
const TLS_SECURITY: &[&str] = &["tls", "xtls", "reality"];

fn text(cfg: &NormalizedConfig, key: &str) -> String {
  cfg.get_text(key).unwrap_or_default().trim().to_lowercase()
}

fn tls_enabled(cfg: &NormalizedConfig) -> bool {
  let security = text(cfg, "security");
  let tls = text(cfg, "tls");
  TLS_SECURITY.contains(&security.as_str()) || matches!(tls.as_str(), "tls" | "1" | "true")
}

fn base_fields(protocol: Option<Protocol>) -> &'static [&'static str] {
  match protocol {
    Some(Protocol::Vless) | Some(Protocol::Vmess) => &["server", "port", "uuid", "type"],
    Some(Protocol::Trojan) => &["server", "port", "password", "sni"],
    Some(Protocol::Shadowsocks) => &["server", "port", "method", "password", "plugin"],
    Some(Protocol::ShadowsocksR) => &[
      "server",
      "port",
      "method",
      "password",
      "protocol-variant",
      "obfs",
    ],
    Some(Protocol::Hysteria2) | Some(Protocol::Tuic) => {
      &["server", "port", "password", "sni", "insecure"]
    }
    None => &["server", "port"],
  }
}

/// Field names that make up a config's identity. Absent fields are simply
/// not listed in the projection.
pub fn identity_keys(cfg: &NormalizedConfig) -> Vec<&'static str> {
  let protocol = Protocol::from_tag(&cfg.protocol);
  let mut keys = base_fields(protocol).to_vec();
  if matches!(protocol, Some(Protocol::Vless) | Some(Protocol::Vmess)) {
    if V2RAY_TRANSPORTS_WITH_HOST.contains(&text(cfg, "type").as_str()) {
      keys.extend(["host", "path"]);
    }
    if tls_enabled(cfg) {
      keys.push("sni");
    }
  }
  keys
}

/// Projects the identity fields. Unknown protocol tags get the weaker
/// server+port identity only.
pub fn identity_fields(cfg: &NormalizedConfig) -> Map<String, Value> {
  let mut out = Map::new();
  for key in identity_keys(cfg) {
    if let Some(v) = cfg.get(key) {
      if !v.is_null() {
        out.insert(key.to_string(), v.clone());
      }
    }
  }
  out
}

/// Sorted-key JSON. String escaping keeps values from ever looking like a
/// delimiter.
fn canonical_serialization(identity: &Map<String, Value>) -> String {
  let mut entries: Vec<(&String, &Value)> = identity.iter().collect();
  entries.sort_by(|a, b| a.0.cmp(b.0));
  let mut out = String::from("{");
  for (i, (k, v)) in entries.into_iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    out.push_str(&Value::String(k.clone()).to_string());
    out.push(':');
    out.push_str(&v.to_string());
  }
  out.push('}');
  out
}

pub fn fingerprint(cfg: &NormalizedConfig) -> Fingerprint {
  let identity = identity_fields(cfg);
  let material = canonical_serialization(&identity);
  let mut hasher = Sha256::new();
  hasher.update(material.as_bytes());
  Fingerprint(format!("{:x}", hasher.finalize()))
}
