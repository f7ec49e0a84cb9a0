use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced while checking an `X-Line-Signature` value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is empty")]
    Empty,
    #[error("signature is not valid base64")]
    Encoding,
    #[error("failed to initialize signature verifier")]
    Key,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies a webhook body against the base64 HMAC-SHA256 digest carried in
/// the signature header.
///
/// The digest is computed over the raw body bytes, keyed with the channel
/// secret. The comparison runs in constant time so a forged signature does
/// not leak how many leading bytes were correct.
pub fn verify(body: &[u8], signature: &str, secret: &[u8]) -> Result<(), SignatureError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(SignatureError::Empty);
    }

    let provided = STANDARD
        .decode(signature)
        .map_err(|_| SignatureError::Encoding)?;
    let expected = digest(body, secret)?;

    if expected.as_slice().ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces the header value the platform would send for `body`.
pub fn sign(body: &[u8], secret: &[u8]) -> Result<String, SignatureError> {
    digest(body, secret).map(|bytes| STANDARD.encode(bytes))
}

fn digest(body: &[u8], secret: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Key)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}
