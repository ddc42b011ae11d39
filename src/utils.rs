use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC of the raw body, GitHub style.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Check a `sha256=<hex>` signature header against the raw request body.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    let Some(signature) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex_decode(signature) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Signature is not valid hex: {}", e);
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    // constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"repository":{"name":"myapp"}}"#;
        let header = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, &header));
    }

    #[test]
    fn rejects_wrong_secret_prefix_or_encoding() {
        let body = b"payload";
        let header = sign("s3cret", body);
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("s3cret", b"tampered", &header));
        assert!(!verify_signature("s3cret", body, header.trim_start_matches("sha256=")));
        assert!(!verify_signature("s3cret", body, "sha256=zzzz"));
    }
}
