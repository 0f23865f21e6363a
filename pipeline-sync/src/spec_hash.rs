//! Order-independent content hash of a pipeline spec.
//!
//! The spec is walked depth-first and fed to SHA-256 as a type-tagged,
//! length-prefixed stream. Object keys are visited in sorted order, so two
//! specs with the same content hash identically no matter how their fields
//! were declared. The digest is truncated to 8 bytes and hex-encoded.

use serde_json::Value;
use sha2::{Digest, Sha256};

use pipeline_core::PipelineSpec;

/// Number of digest bytes kept in the printable token.
const TOKEN_BYTES: usize = 8;

/// Hash `spec` into a short printable token (16 hex characters).
pub fn compute(spec: &PipelineSpec) -> String {
    let mut hasher = Sha256::new();
    write_value(&mut hasher, &spec.0);
    let digest = hasher.finalize();
    hex::encode(&digest[..TOKEN_BYTES])
}

fn write_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            hasher.update(b"d");
            write_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"a");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(b"o");
            hasher.update((map.len() as u64).to_le_bytes());
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                write_str(hasher, key);
                write_value(hasher, item);
            }
        }
    }
}

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
