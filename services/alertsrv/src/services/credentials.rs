//! Device credential checks
//!
//! API keys are stored as hex SHA-256 digests. Payload signatures are
//! HMAC-SHA256 over the canonical request body, presented as hex or
//! base64. Every comparison runs in constant time and every decode failure
//! is a plain `false`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::digest::{CtOutput, Output};
use sha2::{Digest, Sha256};

use stockwatch_model::Device;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex SHA-256 of an API key, as stored on the device record
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

/// Compare a presented API key against the stored digest
pub fn verify_api_key(stored_hash: &str, presented: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hash.trim()) else {
        return false;
    };
    let Some(stored) = Output::<Sha256>::from_exact_iter(stored) else {
        return false;
    };
    let computed = Sha256::digest(presented.as_bytes());
    CtOutput::<Sha256>::new(computed) == CtOutput::new(stored)
}

/// Device-level convenience over [`verify_api_key`]
pub fn verify_device_key(device: &Device, presented: &str) -> bool {
    verify_api_key(&device.api_key_hash, presented)
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign_payload(payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Check an HMAC-SHA256 signature over `payload`
///
/// Accepts hex in either case or standard base64, with an optional
/// `sha256=` prefix.
pub fn verify_signature(payload: &[u8], presented: &str, secret: &str) -> bool {
    let presented = presented.trim();
    let presented = presented.strip_prefix(SIGNATURE_PREFIX).unwrap_or(presented);
    if presented.is_empty() {
        return false;
    }

    let Some(expected) = decode_signature(presented) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn decode_signature(presented: &str) -> Option<Vec<u8>> {
    match hex::decode(presented) {
        Ok(bytes) if bytes.len() == 32 => Some(bytes),
        _ => STANDARD.decode(presented).ok(),
    }
}
