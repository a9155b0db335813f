use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Closed set of link schemes the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
  Vless,
  Vmess,
  Trojan,
  Shadowsocks,
  ShadowsocksR,
  Hysteria2,
  Tuic,
}

impl Protocol {
  pub const ALL: [Protocol; 7] = [
    Protocol::Vless,
    Protocol::Vmess,
    Protocol::Trojan,
    Protocol::Shadowsocks,
    Protocol::ShadowsocksR,
    Protocol::Hysteria2,
    Protocol::Tuic,
  ];

  pub fn tag(self) -> &'static str {
    match self {
      Protocol::Vless => "vless",
      Protocol::Vmess => "vmess",
      Protocol::Trojan => "trojan",
      Protocol::Shadowsocks => "ss",
      Protocol::ShadowsocksR => "ssr",
      Protocol::Hysteria2 => "hy2",
      Protocol::Tuic => "tuic",
    }
  }

  pub fn from_tag(tag: &str) -> Option<Protocol> {
    let t = tag.trim().to_lowercase();
    Protocol::ALL.into_iter().find(|p| p.tag() == t)
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// Fields produced by the link parser for one raw line.
///
/// `protocol` is the dispatch tag and lives outside `fields`, so a field
/// literally named `protocol` can never shadow it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedConfig {
  pub protocol: String,
  pub fields: Map<String, Value>,
}

impl ParsedConfig {
  pub fn new(protocol: Protocol) -> Self {
    Self {
      protocol: protocol.tag().to_string(),
      fields: Map::new(),
    }
  }

  #[cfg(test)]
  pub fn with_tag(tag: impl Into<String>) -> Self {
    Self {
      protocol: tag.into(),
      fields: Map::new(),
    }
  }

  pub fn set(&mut self, key: &str, value: impl Into<Value>) {
    self.fields.insert(key.to_string(), value.into());
  }

  pub fn set_str(&mut self, key: &str, value: &str) {
    let t = value.trim();
    if !t.is_empty() {
      self.fields.insert(key.to_string(), Value::String(t.to_string()));
    }
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.fields.get(key).and_then(|v| v.as_str())
  }
}

/// A parsed config after canonicalization. `fields` is a `serde_json::Map`
/// (BTreeMap backed), so nested keys are always sorted on serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedConfig {
  pub protocol: String,
  pub fields: Map<String, Value>,
}

impl NormalizedConfig {
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.fields.get(key)
  }

  pub fn get_text(&self, key: &str) -> Option<String> {
    match self.fields.get(key)? {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }
}

impl From<NormalizedConfig> for ParsedConfig {
  fn from(n: NormalizedConfig) -> Self {
    ParsedConfig {
      protocol: n.protocol,
      fields: n.fields,
    }
  }
}

/// Per-protocol field defaults, backfilled by the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolDefaults {
  by_protocol: HashMap<String, Map<String, Value>>,
}

impl ProtocolDefaults {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Builds the table, canonicalizing every entry the same way parsed
  /// fields are canonicalized.
  pub fn new(raw: HashMap<String, Map<String, Value>>) -> Self {
    let mut by_protocol = HashMap::new();
    for (proto, fields) in raw {
      let key = proto.trim().to_lowercase();
      if key.is_empty() {
        continue;
      }
      by_protocol.insert(key, crate::normalize::canonical_map(&fields));
    }
    Self { by_protocol }
  }

  pub fn for_protocol(&self, tag: &str) -> Option<&Map<String, Value>> {
    self.by_protocol.get(&tag.trim().to_lowercase())
  }

  pub fn is_empty(&self) -> bool {
    self.by_protocol.is_empty()
  }

  pub fn len(&self) -> usize {
    self.by_protocol.len()
  }
}
