//! Content digests over a block's canonical field set.
//!
//! The canonical form is the text Python's `json.dumps(obj, sort_keys=True)`
//! produces: keys sorted at every level, `", "` and `": "` separators, and
//! everything outside printable ASCII escaped as lowercase `\uXXXX`. Ledgers
//! written by the original registry therefore verify unchanged.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// `previous_hash` of the first block in a ledger.
pub const EMPTY_DIGEST: &str = "";

/// SHA-256 digest of the canonical encoding of `fields`, as 64 lowercase hex chars.
pub fn digest_fields(fields: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(&mut out, fields);
    sha256_hex(out.as_bytes())
}

/// Compute the SHA-256 hex digest of some data.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Deterministic text encoding of a JSON value, independent of key insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    // serde_json may be built with `preserve_order`, so never trust map order.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_string(out, key);
        out.push_str(": ");
        write_value(out, &map[key]);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn matches_python_sorted_dumps() {
        let v = json!({"b": 1, "a": [true, null, "x"], "c": {"z": "", "y": 2}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a": [true, null, "x"], "b": 1, "c": {"y": 2, "z": ""}}"#
        );
    }

    #[test]
    fn escapes_like_ensure_ascii() {
        let v = json!("Abebe Bikila\u{e9}\n\"q\" \u{1f600}\u{7f}");
        assert_eq!(
            canonical_json(&v),
            r#""Abebe Bikila\u00e9\n\"q\" \ud83d\ude00\u007f""#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut m1 = Map::new();
        m1.insert("owner_name".into(), json!("Abel"));
        m1.insert("record_type".into(), json!("Other"));
        let mut m2 = Map::new();
        m2.insert("record_type".into(), json!("Other"));
        m2.insert("owner_name".into(), json!("Abel"));
        assert_eq!(digest_fields(&m1), digest_fields(&m2));
    }

    #[test]
    fn digest_is_64_lowercase_hex() {
        let d = digest_fields(&object(json!({"a": "b"})));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn value_change_changes_digest() {
        let a = digest_fields(&object(json!({"owner_name": "Abel"})));
        let b = digest_fields(&object(json!({"owner_name": "Abe1"})));
        assert_ne!(a, b);
    }
}
