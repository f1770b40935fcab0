//! Converting image data to a `data:` URL for vision prompts.

use base64::{Engine as _, prelude::BASE64_STANDARD};

use crate::prelude::*;

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Strip a leading `data:<mime>;base64,` prefix, if present.
pub fn strip_data_url_prefix(data: &str) -> &str {
    let Some(rest) = data.strip_prefix("data:") else {
        return data;
    };
    match rest.split_once(";base64,") {
        Some((_mime, payload)) => payload,
        None => data,
    }
}

/// Remove anything that isn't part of the base64 alphabet.
///
/// Camera pickers occasionally hand us payloads with embedded whitespace or
/// line breaks, which the upstream API rejects.
pub fn clean_base64(data: &str) -> String {
    data.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect()
}

/// Decode cleaned base64 data into raw bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(data)
        .context("image data is not valid base64")
}

/// Encode raw bytes as base64.
pub fn encode_base64(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Detect the MIME type of decoded image bytes, defaulting to JPEG.
pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match infer::get(bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => {
            // `infer` returns 'static strings for known types.
            match kind.mime_type() {
                "image/png" => "image/png",
                "image/gif" => "image/gif",
                "image/webp" => "image/webp",
                "image/bmp" => "image/bmp",
                _ => "image/jpeg",
            }
        }
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_data_url_prefix() {
        assert_eq!(
            strip_data_url_prefix("data:image/png;base64,iVBORw0KGgo="),
            "iVBORw0KGgo="
        );
        assert_eq!(strip_data_url_prefix("iVBORw0KGgo="), "iVBORw0KGgo=");
    }

    #[test]
    fn test_clean_base64() {
        assert_eq!(clean_base64("aGVs\nbG8 =\r\n"), "aGVsbG8=");
    }

    #[test]
    fn test_round_trip() {
        let encoded = encode_base64(b"hello");
        assert_eq!(decode_base64(&encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_detect_image_mime() {
        // Minimal PNG signature.
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(detect_image_mime(&png), "image/png");
        // Unknown bytes fall back to JPEG.
        assert_eq!(detect_image_mime(b"not an image"), "image/jpeg");
    }

    #[test]
    fn test_data_url() {
        assert_eq!(
            data_url("image/jpeg", "aGVsbG8="),
            "data:image/jpeg;base64,aGVsbG8="
        );
    }
}
