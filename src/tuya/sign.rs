//! HMAC-SHA256 request signing for the Tuya OpenAPI.

use crate::error::{ExporterError, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Value of the `sign_method` header.
pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// Lowercase hex SHA-256 of a request body.
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Canonical request description covered by the signature.
///
/// No headers take part in the signature, so the header block is empty.
/// `path_and_query` must already carry its query parameters sorted by name.
pub fn string_to_sign(method: &str, body: &[u8], path_and_query: &str) -> String {
    format!(
        "{}\n{}\n\n{}",
        method.to_uppercase(),
        content_hash(body),
        path_and_query
    )
}

/// Signature for one request; `access_token` is `None` for token requests.
pub fn sign(
    secret: &str,
    client_id: &str,
    access_token: Option<&str>,
    timestamp_ms: i64,
    nonce: &str,
    string_to_sign: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExporterError::auth_error(format!("invalid access secret: {}", e)))?;

    mac.update(client_id.as_bytes());
    if let Some(token) = access_token {
        mac.update(token.as_bytes());
    }
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(nonce.as_bytes());
    mac.update(string_to_sign.as_bytes());

    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_string_to_sign_layout() {
        let s = string_to_sign("get", b"", "/v1.0/token?grant_type=1");
        assert_eq!(s, format!("GET\n{}\n\n/v1.0/token?grant_type=1", EMPTY_SHA256));
    }

    #[test]
    fn test_signature_is_uppercase_hex() {
        let s = string_to_sign("GET", b"", "/v1.0/devices/abc/status");
        let signature = sign("secret", "client", Some("token"), 1700000000000, "n", &s).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_access_token_changes_signature() {
        let s = string_to_sign("GET", b"", "/v1.0/token?grant_type=1");
        let without = sign("secret", "client", None, 1, "nonce", &s).unwrap();
        let with = sign("secret", "client", Some("tok"), 1, "nonce", &s).unwrap();
        assert_ne!(without, with);
        assert_eq!(without, sign("secret", "client", None, 1, "nonce", &s).unwrap());
    }

    #[test]
    fn test_signature_matches_concatenated_input() {
        let s = string_to_sign("GET", b"", "/p");
        let split = sign("k", "id", Some("tok"), 42, "n", &s).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"k").unwrap();
        mac.update(format!("idtok42n{}", s).as_bytes());
        let joined = hex::encode_upper(mac.finalize().into_bytes());

        assert_eq!(split, joined);
    }
}
