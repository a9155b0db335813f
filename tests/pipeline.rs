use base64::engine::general_purpose;
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use subdedup::fingerprint::fingerprint;
use subdedup::model::{ParsedConfig, Protocol, ProtocolDefaults};
use subdedup::normalize::normalize;
use subdedup::parse::parse_link;
use subdedup::pipeline::{process_line, process_payload};
use subdedup::source::parse_defaults;

fn b64(s: &str) -> String {
  general_purpose::STANDARD.encode(s.as_bytes())
}

fn defaults() -> ProtocolDefaults {
  parse_defaults(
    "ss:\n  plugin: none\nhy2:\n  insecure: 0\nvless:\n  type: tcp\n  encryption: none\n",
  )
  .unwrap()
}

#[test]
fn ss_encodings_normalize_identically() {
  let d = defaults();
  let lines = [
    "ss://aes-256-gcm:pass@1.2.3.4:8388#plain".to_string(),
    format!("ss://{}@1.2.3.4:8388#userinfo", b64("aes-256-gcm:pass")),
    format!("ss://{}#whole", b64("aes-256-gcm:pass@1.2.3.4:8388")),
  ];
  let normalized: Vec<_> = lines
    .iter()
    .map(|l| normalize(&parse_link(l).unwrap(), &d))
    .collect();
  assert_eq!(normalized[0], normalized[1]);
  assert_eq!(normalized[1], normalized[2]);
  assert_eq!(normalized[0].get("plugin"), Some(&json!("none")));
}

#[test]
fn remarks_never_change_the_fingerprint() {
  let d = defaults();
  let base = parse_link("trojan://pw@t.example:443?sni=s.example").unwrap();
  let mut noisy = base.clone();
  noisy.set("remarks", "HK 01 | 10x");
  noisy.set("Timestamp", 1_700_000_000);
  noisy.set("group", "premium");
  assert_eq!(
    fingerprint(&normalize(&base, &d)),
    fingerprint(&normalize(&noisy, &d))
  );
}

#[test]
fn defaults_make_absent_and_default_fields_equal() {
  let d = defaults();
  let explicit = process_line("hy2://pw@h.example:443?insecure=0", &d).unwrap();
  let implicit = process_line("hy2://pw@h.example:443#x", &d).unwrap();
  assert_eq!(explicit.fingerprint, implicit.fingerprint);

  let insecure = process_line("hy2://pw@h.example:443?insecure=1", &d).unwrap();
  assert_ne!(explicit.fingerprint, insecure.fingerprint);

  let tcp = process_line("vless://u@h:443?type=tcp", &d).unwrap();
  let bare = process_line("vless://u@h:443", &d).unwrap();
  assert_eq!(tcp.fingerprint, bare.fingerprint);
}

#[test]
fn trojan_sni_comes_from_defaults_when_absent() {
  let d = parse_defaults("trojan:\n  sni: example.com\n").unwrap();
  let bare = process_line("trojan://pw@h.example:443", &d).unwrap();
  let explicit = process_line("trojan://pw@h.example:443?sni=example.com", &d).unwrap();
  assert_eq!(bare.config.get("sni"), Some(&json!("example.com")));
  assert_eq!(bare.fingerprint, explicit.fingerprint);

  let peer = process_line("trojan://pw@h.example:443?peer=other.example", &d).unwrap();
  assert_eq!(peer.config.get("sni"), Some(&json!("other.example")));
  assert_ne!(bare.fingerprint, peer.fingerprint);
}

#[test]
fn uuid_case_does_not_split_identity() {
  let d = ProtocolDefaults::empty();
  let upper = process_line("vless://0F0E0D0C-AAAA-4000-8000-00000000000B@h:443", &d).unwrap();
  let lower = process_line("vless://0f0e0d0c-aaaa-4000-8000-00000000000b@h:443", &d).unwrap();
  assert_eq!(upper.fingerprint, lower.fingerprint);
}

#[test]
fn vmess_json_and_uri_forms_agree() {
  let d = defaults();
  let blob = json!({"ps": "a", "add": "v.example", "port": 443, "id": "u", "net": "ws",
                    "host": "cdn.example", "path": "/ws", "tls": "tls", "sni": "cdn.example"});
  let from_json = process_line(&format!("vmess://{}", b64(&blob.to_string())), &d).unwrap();
  let from_uri = process_line(
    "vmess://u@v.example:443?type=ws&host=cdn.example&path=%2Fws&tls=tls&sni=cdn.example#b",
    &d,
  )
  .unwrap();
  assert_eq!(from_json.fingerprint, from_uri.fingerprint);
}

#[test]
fn normalization_is_idempotent_for_every_scheme() {
  let d = defaults();
  let ssr_inner = format!(
    "s.example:443:origin:aes-128-cfb:plain:{}/?remarks={}",
    general_purpose::URL_SAFE_NO_PAD.encode("pw"),
    general_purpose::URL_SAFE_NO_PAD.encode("r")
  );
  let lines = [
    "vless://u@h:443?type=ws&path=/x#r".to_string(),
    "vmess://u@h:443#r".to_string(),
    "trojan://p@h:443#r".to_string(),
    "ss://aes-256-gcm:p@h:1#r".to_string(),
    format!("ssr://{}", general_purpose::URL_SAFE_NO_PAD.encode(ssr_inner)),
    "hy2://p@h:443#r".to_string(),
    "tuic://u:p@h:443#r".to_string(),
  ];
  for line in &lines {
    let once = normalize(&parse_link(line).unwrap(), &d);
    let twice = normalize(&ParsedConfig::from(once.clone()), &d);
    assert_eq!(
      serde_json::to_string(&once).unwrap(),
      serde_json::to_string(&twice).unwrap(),
      "{line}"
    );
    assert!(once.get("remarks").is_none(), "{line}");
  }
}

#[test]
fn key_permutations_and_case_variants_normalize_equal() {
  let d = defaults();
  let pairs = [("server", json!("h")), ("port", json!(1)), ("method", json!("m")), ("password", json!("p"))];
  let mut forward = Map::new();
  for (k, v) in pairs.iter() {
    forward.insert(k.to_string(), v.clone());
  }
  let mut reversed = Map::new();
  for (k, v) in pairs.iter().rev() {
    reversed.insert(k.to_uppercase(), v.clone());
  }
  let mk = |fields: Map<String, Value>| {
    let mut c = ParsedConfig::new(Protocol::Shadowsocks);
    c.fields = fields;
    normalize(&c, &d)
  };
  assert_eq!(
    serde_json::to_string(&mk(forward)).unwrap(),
    serde_json::to_string(&mk(reversed)).unwrap()
  );
}

#[test]
fn per_source_dedup_keeps_first_raw_line() {
  let d = defaults();
  let feed = "vless://uuid@host:443?type=ws&host=a.com&path=/x#r1\n\
              foo://bar\n\
              vless://uuid@host:443?type=ws&host=a.com&path=/x#r2\n\
              ss://YWVzLTI1Ni1nY206cGFzcw==@1.2.3.4:8388#test\n\
              ss://aes-256-gcm:pass@1.2.3.4:8388#same-node\n";
  let a = process_payload("a", feed, &d);
  assert_eq!(
    a.kept,
    vec![
      "vless://uuid@host:443?type=ws&host=a.com&path=/x#r1",
      "ss://YWVzLTI1Ni1nY206cGFzcw==@1.2.3.4:8388#test",
    ]
  );
  assert_eq!(a.failed, 1);
  assert_eq!(a.duplicates, 2);

  // the same feed under another source keeps its own copy
  let b = process_payload("b", &b64(feed), &d);
  assert_eq!(a.kept, b.kept);
}

#[test]
fn unknown_defaults_protocols_are_harmless() {
  let mut raw = HashMap::new();
  raw.insert("socks".to_string(), Map::new());
  let d = ProtocolDefaults::new(raw);
  assert!(process_line("trojan://p@h:443", &d).is_ok());
}
