use crate::decode::{decode_base64_text, DecodeError};
use crate::model::{ParsedConfig, Protocol};
use percent_encoding::percent_decode_str;
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("unsupported scheme: {0}")]
  UnsupportedScheme(String),
  #[error("malformed uri: {0}")]
  MalformedUri(String),
  #[error("missing {0}")]
  MissingField(&'static str),
  #[error("invalid port: {0:?}")]
  InvalidPort(String),
  #[error("bad base64: {0}")]
  Decode(#[from] DecodeError),
  #[error("bad vmess json: {0}")]
  Json(String),
  #[error("credentials lack a ':' separator")]
  MissingSeparator,
}

type SchemeParser = fn(&str) -> Result<ParsedConfig, ParseError>;

/// Scheme table. Adding a protocol means one `Protocol` variant plus one row here.
const SCHEMES: &[(&str, SchemeParser)] = &[
  ("vless", parse_vless),
  ("vmess", parse_vmess),
  ("trojan", parse_trojan),
  ("ss", parse_ss),
  ("ssr", parse_ssr),
  ("hy2", parse_hy2),
  ("hysteria2", parse_hy2),
  ("tuic", parse_tuic),
];

/// Parses one raw subscription line. Never panics on hostile input; every
/// failure is reported as a `ParseError` for that line only.
pub fn parse_link(line: &str) -> Result<ParsedConfig, ParseError> {
  let s = line.trim();
  let (scheme, _) = s
    .split_once("://")
    .ok_or_else(|| ParseError::MalformedUri("no scheme separator".to_string()))?;
  let scheme = scheme.to_lowercase();
  let parser = SCHEMES
    .iter()
    .find(|(name, _)| *name == scheme)
    .map(|(_, f)| *f)
    .ok_or_else(|| ParseError::UnsupportedScheme(scheme.clone()))?;
  parser(s)
}

fn percent_decode_to_string(s: &str) -> String {
  match percent_decode_str(s).decode_utf8() {
    Ok(cow) => cow.to_string(),
    Err(_) => s.to_string(),
  }
}

fn to_bool(v: &str) -> bool {
  let s = v.trim().to_lowercase();
  matches!(s.as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn body_after_scheme(s: &str) -> &str {
  s.split_once("://").map(|(_, b)| b).unwrap_or("").trim()
}

fn canonical_host(h: &str) -> String {
  h.trim()
    .trim_start_matches('[')
    .trim_end_matches(']')
    .to_lowercase()
}

fn parse_port(raw: &str) -> Result<u16, ParseError> {
  match raw.trim().parse::<u16>() {
    Ok(p) if p > 0 => Ok(p),
    _ => Err(ParseError::InvalidPort(raw.trim().to_string())),
  }
}

/// `host:port` or `[v6]:port`, with an optional trailing `/`.
fn split_host_port(s: &str) -> Result<(String, u16), ParseError> {
  let s = s.trim().trim_end_matches('/');
  let (host, port) = s
    .rsplit_once(':')
    .ok_or(ParseError::InvalidPort(String::new()))?;
  let host = canonical_host(host);
  if host.is_empty() {
    return Err(ParseError::MissingField("server"));
  }
  Ok((host, parse_port(port)?))
}

#[derive(Debug)]
struct UriParts {
  host: String,
  port: u16,
  userinfo: String,
  params: Vec<(String, String)>,
  fragment: String,
}

impl UriParts {
  fn param(&self, key: &str) -> Option<&str> {
    self
      .params
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
      .filter(|v| !v.is_empty())
  }
}

fn split_uri(raw: &str) -> Result<UriParts, ParseError> {
  let u = Url::parse(raw).map_err(|e| ParseError::MalformedUri(e.to_string()))?;
  let host = canonical_host(&percent_decode_to_string(u.host_str().unwrap_or("")));
  if host.is_empty() {
    return Err(ParseError::MissingField("server"));
  }
  let port = u.port().ok_or(ParseError::InvalidPort(String::new()))?;
  if port == 0 {
    return Err(ParseError::InvalidPort("0".to_string()));
  }
  let mut userinfo = percent_decode_to_string(u.username());
  if let Some(pw) = u.password() {
    userinfo.push(':');
    userinfo.push_str(&percent_decode_to_string(pw));
  }
  let mut params: Vec<(String, String)> = Vec::new();
  for (k, v) in u.query_pairs() {
    let key = k.trim().to_lowercase();
    if key.is_empty() || params.iter().any(|(seen, _)| *seen == key) {
      continue;
    }
    params.push((key, v.trim().to_string()));
  }
  let fragment = u
    .fragment()
    .map(percent_decode_to_string)
    .unwrap_or_default()
    .trim()
    .to_string();
  Ok(UriParts {
    host,
    port,
    userinfo: userinfo.trim().to_string(),
    params,
    fragment,
  })
}

fn merge_params(cfg: &mut ParsedConfig, params: &[(String, String)], skip: &[&str]) {
  for (k, v) in params {
    if skip.contains(&k.as_str()) {
      continue;
    }
    cfg.set_str(k, v);
  }
}

fn finish_authority(cfg: &mut ParsedConfig, u: &UriParts) {
  cfg.set("server", u.host.clone());
  cfg.set("port", u.port);
  cfg.set_str("remarks", &u.fragment);
}

fn parse_vless(raw: &str) -> Result<ParsedConfig, ParseError> {
  let u = split_uri(raw)?;
  vless_like(Protocol::Vless, u)
}

fn vless_like(protocol: Protocol, u: UriParts) -> Result<ParsedConfig, ParseError> {
  if u.userinfo.is_empty() {
    return Err(ParseError::MissingField("uuid"));
  }
  let mut cfg = ParsedConfig::new(protocol);
  merge_params(&mut cfg, &u.params, &["servername"]);
  if let Some(sni) = u.param("sni").or(u.param("servername")) {
    cfg.set_str("sni", sni);
  }
  cfg.set("uuid", u.userinfo.clone());
  finish_authority(&mut cfg, &u);
  Ok(cfg)
}

fn parse_trojan(raw: &str) -> Result<ParsedConfig, ParseError> {
  let u = split_uri(raw)?;
  if u.userinfo.is_empty() {
    return Err(ParseError::MissingField("password"));
  }
  let mut cfg = ParsedConfig::new(Protocol::Trojan);
  merge_params(&mut cfg, &u.params, &["peer"]);
  if let Some(sni) = u.param("sni").or(u.param("peer")) {
    cfg.set_str("sni", sni);
  }
  cfg.set("password", u.userinfo.clone());
  finish_authority(&mut cfg, &u);
  Ok(cfg)
}

fn parse_vmess(raw: &str) -> Result<ParsedConfig, ParseError> {
  let body = body_after_scheme(raw);
  if body.contains('@') {
    if let Ok(u) = split_uri(raw) {
      return vless_like(Protocol::Vmess, u);
    }
  }
  parse_vmess_json(body.split('#').next().unwrap_or(""))
}

const VMESS_JSON_FIELDS: &[(&str, &str)] = &[
  ("ps", "remarks"),
  ("add", "server"),
  ("port", "port"),
  ("id", "uuid"),
  ("aid", "alterId"),
  ("net", "type"),
  ("host", "host"),
  ("path", "path"),
  ("tls", "tls"),
  ("sni", "sni"),
];

fn json_scalar_text(v: &JsonValue) -> Option<String> {
  match v {
    JsonValue::String(s) => Some(s.trim().to_string()),
    JsonValue::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn parse_vmess_json(b64: &str) -> Result<ParsedConfig, ParseError> {
  let json_text = decode_base64_text(b64)?;
  let obj: JsonValue =
    serde_json::from_str(json_text.trim()).map_err(|e| ParseError::Json(e.to_string()))?;
  let map: serde_json::Map<String, JsonValue> = obj
    .as_object()
    .ok_or_else(|| ParseError::Json("not an object".to_string()))?
    .iter()
    .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
    .collect();

  let mut cfg = ParsedConfig::new(Protocol::Vmess);
  for (key, v) in &map {
    if key == "v" || key == "scy" || key == "security" {
      continue;
    }
    if VMESS_JSON_FIELDS.iter().any(|(src, _)| src == key) {
      continue;
    }
    match v {
      JsonValue::String(s) => cfg.set_str(key, s),
      other => cfg.set(key, other.clone()),
    }
  }
  for (src, dst) in VMESS_JSON_FIELDS {
    let Some(v) = map.get(*src) else { continue };
    match *src {
      "port" => {
        let text = json_scalar_text(v).unwrap_or_default();
        cfg.set("port", parse_port(&text)?);
      }
      "aid" => {
        if let Some(t) = json_scalar_text(v) {
          match t.parse::<i64>() {
            Ok(n) => cfg.set(dst, n),
            Err(_) => cfg.set_str(dst, &t),
          }
        }
      }
      _ => {
        if let Some(t) = json_scalar_text(v) {
          cfg.set_str(dst, &t);
        }
      }
    }
  }
  let security = map
    .get("scy")
    .and_then(json_scalar_text)
    .filter(|s| !s.is_empty())
    .or_else(|| map.get("security").and_then(json_scalar_text));
  if let Some(s) = security {
    cfg.set_str("security", &s);
  }

  match cfg.get_str("server") {
    Some(host) => {
      let host = canonical_host(host);
      cfg.set("server", host);
    }
    None => return Err(ParseError::MissingField("server")),
  }
  if !cfg.fields.contains_key("port") {
    return Err(ParseError::InvalidPort(String::new()));
  }
  if cfg.get_str("uuid").is_none() {
    return Err(ParseError::MissingField("uuid"));
  }
  Ok(cfg)
}

fn split_method_password(creds: &str) -> Result<(String, String), ParseError> {
  let (m, p) = creds.split_once(':').ok_or(ParseError::MissingSeparator)?;
  let (m, p) = (m.trim(), p.trim());
  if m.is_empty() {
    return Err(ParseError::MissingField("method"));
  }
  if p.is_empty() {
    return Err(ParseError::MissingField("password"));
  }
  Ok((m.to_string(), p.to_string()))
}

fn parse_ss(raw: &str) -> Result<ParsedConfig, ParseError> {
  let body = body_after_scheme(raw);
  let (before_hash, hash) = body.split_once('#').unwrap_or((body, ""));
  let (main, query) = before_hash.split_once('?').unwrap_or((before_hash, ""));
  let main = main.trim();
  if main.is_empty() {
    return Err(ParseError::MissingField("credentials"));
  }

  let ((method, password), host_port) = match main.rsplit_once('@') {
    Some((userinfo, host_port)) => {
      let userinfo = percent_decode_to_string(userinfo);
      let creds = if userinfo.contains(':') {
        userinfo
      } else {
        decode_base64_text(&userinfo)?
      };
      (split_method_password(&creds)?, host_port.to_string())
    }
    None => {
      let decoded = decode_base64_text(main)?;
      let (creds, host_port) = decoded
        .trim()
        .rsplit_once('@')
        .ok_or(ParseError::MissingField("server"))?;
      (split_method_password(creds)?, host_port.to_string())
    }
  };
  let (server, port) = split_host_port(&host_port)?;

  let mut cfg = ParsedConfig::new(Protocol::Shadowsocks);
  for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
    cfg.set_str(&k.trim().to_lowercase(), &v);
  }
  cfg.set("method", method.to_lowercase());
  cfg.set("password", password);
  cfg.set("server", server);
  cfg.set("port", port);
  cfg.set_str("remarks", &percent_decode_to_string(hash));
  Ok(cfg)
}

fn parse_ssr(raw: &str) -> Result<ParsedConfig, ParseError> {
  let body = body_after_scheme(raw);
  let body = body.split('#').next().unwrap_or("");
  let decoded = decode_base64_text(body)?;
  let decoded = decoded.trim();
  let (main, query) = decoded
    .split_once("/?")
    .or_else(|| decoded.split_once('?'))
    .unwrap_or((decoded, ""));

  let parts: Vec<&str> = main.trim_end_matches('/').rsplitn(6, ':').collect();
  let [password_b64, obfs, method, variant, port, server] = parts[..] else {
    return Err(ParseError::MissingField("ssr colon field"));
  };
  let server = canonical_host(server);
  if server.is_empty() {
    return Err(ParseError::MissingField("server"));
  }
  let password = decode_base64_text(password_b64)?;

  let mut cfg = ParsedConfig::new(Protocol::ShadowsocksR);
  for pair in query.split('&') {
    let Some((k, v)) = pair.split_once('=') else { continue };
    let key = k.trim().to_lowercase();
    if key.is_empty() || v.trim().is_empty() {
      continue;
    }
    cfg.set_str(&key, &decode_base64_text(v)?);
  }
  cfg.set("server", server);
  cfg.set("port", parse_port(port)?);
  cfg.set_str("protocol-variant", variant);
  cfg.set_str("method", &method.to_lowercase());
  cfg.set_str("obfs", obfs);
  cfg.set_str("password", &password);
  for (key, name) in [("protocol-variant", "protocol"), ("method", "method"), ("obfs", "obfs")] {
    if !cfg.fields.contains_key(key) {
      return Err(ParseError::MissingField(name));
    }
  }
  if cfg.get_str("password").is_none() {
    return Err(ParseError::MissingField("password"));
  }
  Ok(cfg)
}

const INSECURE_KEYS: &[&str] = &["insecure", "allowinsecure", "skip-cert-verify"];

fn quic_like(protocol: Protocol, raw: &str) -> Result<ParsedConfig, ParseError> {
  let u = split_uri(raw)?;
  if u.userinfo.is_empty() {
    return Err(ParseError::MissingField("password"));
  }
  let mut cfg = ParsedConfig::new(protocol);
  merge_params(&mut cfg, &u.params, INSECURE_KEYS);
  let sni = u.param("sni").unwrap_or(u.host.as_str()).to_string();
  cfg.set_str("sni", &sni);
  if let Some(flag) = INSECURE_KEYS.iter().find_map(|k| u.param(k)) {
    cfg.set("insecure", u8::from(to_bool(flag)));
  }
  cfg.set("password", u.userinfo.clone());
  finish_authority(&mut cfg, &u);
  Ok(cfg)
}

fn parse_hy2(raw: &str) -> Result<ParsedConfig, ParseError> {
  quic_like(Protocol::Hysteria2, raw)
}

fn parse_tuic(raw: &str) -> Result<ParsedConfig, ParseError> {
  quic_like(Protocol::Tuic, raw)
}
