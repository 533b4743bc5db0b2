use serde::{Deserialize, Serialize};

/// Wire format of an encrypted API response
///
/// ```json
/// { "data": "<hex>", "iv": "<hex>", "tag": "<hex>", "compressed": false }
/// ```
///
/// `data` is the ciphertext without the authentication tag, which travels
/// separately in `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub data: String,
    pub iv: String,
    pub tag: String,
    pub compressed: bool,
}

/// Structural check telling encrypted responses apart from plain ones
///
/// True only for a JSON object carrying string `data`, `iv` and `tag` fields
/// and a boolean `compressed` field. Never fails.
pub fn is_encrypted_envelope(value: &serde_json::Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    ["data", "iv", "tag"]
        .iter()
        .all(|field| object.get(*field).is_some_and(serde_json::Value::is_string))
        && object
            .get("compressed")
            .is_some_and(serde_json::Value::is_boolean)
}
