//! Key codec: raw key bytes to and from standard base64.
//!
//! Pure functions. The only failure mode is malformed input, reported as
//! [`CodecError`] and confined to the single key being decoded.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Malformed key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input is not valid standard base64.
    #[error("malformed key encoding: {0}")]
    InvalidEncoding(String),

    /// Input decoded to the wrong number of bytes.
    #[error("malformed key length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Decoded length
        actual: usize,
    },
}

/// Encode raw key bytes as standard (padded) base64.
pub fn encode_key(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 into raw bytes.
///
/// Surrounding whitespace is ignored; anything else that is not base64 is an
/// error.
pub fn decode_key(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD.decode(text.trim()).map_err(|e| CodecError::InvalidEncoding(e.to_string()))
}

/// Decode standard base64 into a fixed-size key.
pub fn decode_key_array<const N: usize>(text: &str) -> Result<[u8; N], CodecError> {
    let bytes = decode_key(text)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CodecError::InvalidLength { expected: N, actual })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encodes_with_padding() {
        assert_eq!(encode_key(b"k"), "aw==");
        assert_eq!(encode_key(&[]), "");
    }

    #[test]
    fn rejects_non_base64() {
        let err = decode_key("not base64!").unwrap_err();
        assert!(matches!(err, CodecError::InvalidEncoding(_)));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(decode_key("  aw==\n").unwrap(), b"k".to_vec());
    }

    #[test]
    fn fixed_size_decode_checks_length() {
        let short = encode_key(&[7u8; 31]);
        assert_eq!(
            decode_key_array::<32>(&short),
            Err(CodecError::InvalidLength { expected: 32, actual: 31 })
        );

        let exact = encode_key(&[7u8; 32]);
        assert_eq!(decode_key_array::<32>(&exact).unwrap(), [7u8; 32]);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            prop_assert_eq!(decode_key(&encode_key(&bytes)).unwrap(), bytes);
        }

        #[test]
        fn decode_never_panics(text in ".{0,64}") {
            let _ = decode_key(&text);
        }
    }
}
