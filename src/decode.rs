use base64::engine::general_purpose;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
  #[error("empty base64 input")]
  Empty,
  #[error("invalid base64: {0}")]
  Base64(String),
}

/// Decodes base64 text (standard or URL-safe alphabet, padding optional).
/// Invalid UTF-8 sequences in the decoded bytes are dropped, not rejected.
pub fn decode_base64_text(s: &str) -> Result<String, DecodeError> {
  let cleaned: String = s
    .chars()
    .filter(|c| !c.is_whitespace())
    .map(|c| match c {
      '-' => '+',
      '_' => '/',
      other => other,
    })
    .collect();
  if cleaned.is_empty() {
    return Err(DecodeError::Empty);
  }
  let mut padded = cleaned;
  let rem = padded.len() % 4;
  if rem != 0 {
    padded.push_str(&"=".repeat(4 - rem));
  }
  let bytes = general_purpose::STANDARD
    .decode(padded.as_bytes())
    .map_err(|e| DecodeError::Base64(e.to_string()))?;
  Ok(utf8_ignoring_invalid(&bytes))
}

fn utf8_ignoring_invalid(bytes: &[u8]) -> String {
  let mut out = String::with_capacity(bytes.len());
  for chunk in bytes.utf8_chunks() {
    out.push_str(chunk.valid());
  }
  out
}

/// One fetched payload after the base64-or-plaintext decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
  text: String,
  was_base64: bool,
}

impl DecodedPayload {
  pub fn was_base64(&self) -> bool {
    self.was_base64
  }

  /// Non-empty trimmed lines. Each call starts over from the first line.
  pub fn lines(&self) -> Lines<'_> {
    Lines {
      inner: self.text.lines(),
    }
  }
}

pub struct Lines<'a> {
  inner: std::str::Lines<'a>,
}

impl<'a> Iterator for Lines<'a> {
  type Item = &'a str;

  fn next(&mut self) -> Option<&'a str> {
    for line in self.inner.by_ref() {
      let t = line.trim();
      if !t.is_empty() {
        return Some(t);
      }
    }
    None
  }
}

/// Tries base64 first; on a definitive failure the payload is taken as
/// plaintext. A decode that yields only whitespace also counts as failure.
pub fn decode_payload(payload: &str) -> DecodedPayload {
  let raw = payload.trim_start_matches('\u{feff}');
  match decode_base64_text(raw) {
    Ok(text) if !text.trim().is_empty() => DecodedPayload {
      text,
      was_base64: true,
    },
    _ => DecodedPayload {
      text: raw.to_string(),
      was_base64: false,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn b64(s: &str) -> String {
    general_purpose::STANDARD.encode(s.as_bytes())
  }

  #[test]
  fn plaintext_payload_passes_through() {
    let p = decode_payload("vless://a@h:1\n\n  trojan://p@h:2  \n");
    assert!(!p.was_base64());
    let lines: Vec<_> = p.lines().collect();
    assert_eq!(lines, vec!["vless://a@h:1", "trojan://p@h:2"]);
  }

  #[test]
  fn base64_payload_is_decoded_and_wrapped_lines_accepted() {
    let encoded = b64("ss://x@1.2.3.4:1\r\nvless://y@h:2\n");
    let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
    let p = decode_payload(&wrapped);
    assert!(p.was_base64());
    assert_eq!(p.lines().count(), 2);
    // restartable
    assert_eq!(p.lines().next(), Some("ss://x@1.2.3.4:1"));
  }

  #[test]
  fn url_safe_alphabet_and_missing_padding() {
    let bytes = [0xfbu8, 0xff, b'o', b'k'];
    let url_safe = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    assert!(url_safe.contains('-') || url_safe.contains('_'));
    assert_eq!(decode_base64_text(&url_safe).unwrap(), "ok");
  }

  #[test]
  fn invalid_utf8_is_ignored() {
    let encoded = general_purpose::STANDARD.encode([b'a', 0xff, b'b']);
    assert_eq!(decode_base64_text(&encoded).unwrap(), "ab");
  }

  #[test]
  fn empty_input_is_an_error() {
    assert_eq!(decode_base64_text("  \n"), Err(DecodeError::Empty));
    assert!(decode_base64_text("not base64!").is_err());
  }
}
