//! Whole-body base64 decoding of subscription feeds.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use thiserror::Error;

/// Standard alphabet that accepts bodies with or without `=` padding.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// URL-safe alphabet, used when the standard one rejects the body.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded feed is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Decode a base64 string, ignoring embedded whitespace and line breaks.
///
/// Providers commonly wrap the body at 76 columns or drop the padding;
/// both are accepted. Bodies using the URL-safe alphabet are accepted too.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    match STANDARD_LENIENT.decode(&cleaned) {
        Ok(bytes) => Ok(bytes),
        Err(standard_err) => URL_SAFE_LENIENT.decode(&cleaned).map_err(|_| standard_err),
    }
}

/// Decode a raw feed body into text.
pub fn decode_feed(body: &[u8]) -> Result<String, FeedError> {
    let text = String::from_utf8_lossy(body);
    let bytes = decode_base64(&text)?;
    Ok(String::from_utf8(bytes)?)
}

/// Split decoded feed text into trimmed, non-empty lines.
pub fn feed_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}
