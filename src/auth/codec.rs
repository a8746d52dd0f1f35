//! Bearer token framing: `base64url(header).base64url(payload).base64url(signature)`.
//!
//! Header and payload are flat, string-keyed compact JSON objects. Keys come
//! out sorted because `serde_json::Map` is ordered, so encoding is canonical.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::auth::error::AuthError;

/// Decoded claims, every scalar rendered as a string.
pub type ClaimMap = BTreeMap<String, String>;

/// The one header this service issues and accepts.
pub fn header() -> Map<String, Value> {
    let mut header = Map::new();
    header.insert("alg".to_string(), Value::from("HS256"));
    header.insert("typ".to_string(), Value::from("JWT"));
    header
}

/// Borrowed view over the three segments of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl TokenSegments<'_> {
    /// The bytes the signature covers: `header "." payload`.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }
}

/// Serialise header and payload and join them into the signing input.
pub fn encode(header: &Map<String, Value>, payload: &Map<String, Value>) -> String {
    format!("{}.{}", encode_segment(header), encode_segment(payload))
}

fn encode_segment(object: &Map<String, Value>) -> String {
    // Map's Display is compact JSON.
    let json = Value::Object(object.clone()).to_string();
    URL_SAFE_NO_PAD.encode(json.as_bytes())
}

/// Split a token into its three segments.
pub fn decode(token: &str) -> Result<TokenSegments<'_>, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    match *parts.as_slice() {
        [header, payload, signature] => Ok(TokenSegments {
            header,
            payload,
            signature,
        }),
        _ => Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        ))),
    }
}

/// Decode one base64url segment into a flat claim map.
///
/// Strings are taken verbatim, numbers and booleans are rendered with their
/// JSON text, nulls are treated as absent. Nested objects or arrays are not
/// part of this token format and are rejected.
pub fn decode_claims(segment: &str) -> Result<ClaimMap, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("segment is not base64url: {}", e)))?;

    let object: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("segment is not a JSON object: {}", e)))?;

    let mut claims = ClaimMap::new();
    for (name, value) in object {
        let rendered = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(AuthError::MalformedToken(format!(
                    "claim `{}` is not a scalar",
                    name
                )));
            }
        };
        claims.insert(name, rendered);
    }

    Ok(claims)
}
