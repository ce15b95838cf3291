//! Rendering of masked field values

use bnpl_core::MaskPolicy;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Placeholder written by [`MaskPolicy::Redact`]
pub const REDACTED: &str = "[masked]";

/// Hex characters kept from the digest by [`MaskPolicy::Hash`]
pub const HASH_PREFIX_LEN: usize = 16;

/// Apply a mask policy to one value; nulls stay null
pub fn mask_value(policy: MaskPolicy, value: &Json) -> Json {
    if value.is_null() {
        return Json::Null;
    }
    match policy {
        MaskPolicy::Redact => Json::String(REDACTED.to_string()),
        MaskPolicy::Null => Json::Null,
        MaskPolicy::Hash => {
            let canonical = match value {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
            Json::String(digest[..HASH_PREFIX_LEN].to_string())
        }
    }
}
