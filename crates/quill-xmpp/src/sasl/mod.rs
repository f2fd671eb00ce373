//! SASL PLAIN payload codec (RFC 4616).
//!
//! A PLAIN initial response is `authzid NUL authcid NUL password`,
//! base64-encoded. Decoded credential buffers are zeroized on drop.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;
use zeroize::Zeroize;

/// Reasons a PLAIN payload fails to decode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlainError {
    /// The payload was not valid base64.
    #[error("invalid base64 payload")]
    Base64,
    /// The decoded payload did not contain exactly three NUL-separated
    /// fields.
    #[error("payload is not authzid NUL authcid NUL password")]
    Format,
    /// A field was not valid UTF-8.
    #[error("payload field is not valid UTF-8")]
    Utf8,
}

/// Decoded PLAIN credentials. The password is wiped on drop.
#[derive(Debug, Default)]
pub struct PlainCredentials {
    /// Authorization identity, usually empty.
    pub authzid: String,
    /// Authentication identity (the username).
    pub authcid: String,
    /// The password.
    pub password: String,
}

impl Drop for PlainCredentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Encodes credentials with an empty authzid.
pub fn encode_plain(authcid: &str, password: &str) -> String {
    let mut payload = format!("\0{authcid}\0{password}");
    let encoded = BASE64.encode(payload.as_bytes());
    payload.zeroize();
    encoded
}

/// Encodes credentials with an explicit authzid.
pub fn encode_plain_with_authzid(authzid: &str, authcid: &str, password: &str) -> String {
    let mut payload = format!("{authzid}\0{authcid}\0{password}");
    let encoded = BASE64.encode(payload.as_bytes());
    payload.zeroize();
    encoded
}

/// Decodes a PLAIN payload into its three fields.
pub fn decode_plain(data: &str) -> Result<PlainCredentials, PlainError> {
    let mut decoded = BASE64.decode(data).map_err(|_| PlainError::Base64)?;

    let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
    if parts.len() != 3 {
        decoded.zeroize();
        return Err(PlainError::Format);
    }

    let result = (|| {
        let authzid = std::str::from_utf8(parts[0]).map_err(|_| PlainError::Utf8)?;
        let authcid = std::str::from_utf8(parts[1]).map_err(|_| PlainError::Utf8)?;
        let password = std::str::from_utf8(parts[2]).map_err(|_| PlainError::Utf8)?;
        Ok(PlainCredentials {
            authzid: authzid.to_string(),
            authcid: authcid.to_string(),
            password: password.to_string(),
        })
    })();

    decoded.zeroize();
    result
}
