//! CBOR-encoded request and response payloads.
//!
//! Session requests are method-tagged (`POST`, `GET`, `PUT`, `DELETE`) the
//! way HTTP callers address a session; prekey requests are op-tagged
//! (`generate`, `export`, `consume`). Both travel inside a [`Request`]
//! envelope and are answered by a [`Response`].
//!
//! Private key material appears in exactly one payload,
//! [`PrekeyResponse::Consumed`], and only once per key id.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    error::ErrorKind,
    prekey::KeyId,
    session::{SessionAttributes, SessionRecord},
};

/// Largest encoded payload accepted on either side of the wire.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Most prekeys, issued or failed, carried by one response.
///
/// A public prekey encodes to about 65 bytes and a batch failure to at most
/// [`MAX_FAILURE_MESSAGE_LEN`] plus about 45, so a full response stays well
/// inside [`MAX_PAYLOAD_SIZE`].
pub const MAX_PREKEYS_PER_RESPONSE: usize = 500;

/// Byte bound on the message of a [`WireBatchFailure`].
pub const MAX_FAILURE_MESSAGE_LEN: usize = 64;

/// Payload encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Serialization failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// Deserialization failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),

    /// Payload exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size
        size: usize,
        /// Limit
        max: usize,
    },
}

/// Session requests, tagged by method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SessionRequest {
    /// Create or overwrite the session.
    #[serde(rename = "POST")]
    Create {
        /// Owning identity
        identity: String,
        /// Account email
        email: String,
        /// Account role
        role: String,
        /// Optional display name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Look the session up (evicts it if expired).
    #[serde(rename = "GET")]
    Get {
        /// Owning identity
        identity: String,
    },

    /// Extend the session's expiry. No-op when absent.
    #[serde(rename = "PUT")]
    Refresh {
        /// Owning identity
        identity: String,
    },

    /// Remove the session. Idempotent.
    #[serde(rename = "DELETE")]
    Delete {
        /// Owning identity
        identity: String,
    },
}

impl SessionRequest {
    /// Identity the request is routed by.
    pub fn identity(&self) -> &str {
        match self {
            Self::Create { identity, .. }
            | Self::Get { identity }
            | Self::Refresh { identity }
            | Self::Delete { identity } => identity,
        }
    }
}

/// Session as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Account email
    pub email: String,
    /// Account role
    pub role: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creation time (Unix ms)
    pub created_at: u64,
    /// Expiry time (Unix ms)
    pub expires_at: u64,
}

impl From<&SessionRecord> for SessionView {
    fn from(record: &SessionRecord) -> Self {
        let SessionAttributes { email, display_name, role } = record.attributes.clone();
        Self {
            email,
            role,
            name: display_name,
            created_at: record.created_at_ms,
            expires_at: record.expires_at_ms,
        }
    }
}

/// Session responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionResponse {
    /// Mutation applied (create, refresh, delete).
    Done,
    /// Result of a lookup.
    Lookup {
        /// Whether a valid session exists
        exists: bool,
        /// The session, when it exists
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<SessionView>,
    },
}

/// Prekey requests, tagged by operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PrekeyRequest {
    /// Mint a batch of prekeys.
    Generate {
        /// Owning identity
        identity: String,
        /// First key id; configured default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_id: Option<KeyId>,
        /// Batch size; configured default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },

    /// List public halves of the live prekeys, one page at a time.
    Export {
        /// Owning identity
        identity: String,
        /// Resume after this id; first page when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<KeyId>,
    },

    /// Take the private half of one prekey, exactly once.
    Consume {
        /// Owning identity
        identity: String,
        /// Key to consume
        key_id: KeyId,
    },
}

impl PrekeyRequest {
    /// Identity the request is routed by.
    pub fn identity(&self) -> &str {
        match self {
            Self::Generate { identity, .. }
            | Self::Export { identity, .. }
            | Self::Consume { identity, .. } => identity,
        }
    }
}

/// Public half of a prekey in transport form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePrekey {
    /// Key id
    pub key_id: KeyId,
    /// Base64 X25519 public key
    pub public_key: String,
}

/// One id of a batch that was not issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBatchFailure {
    /// Key id that failed
    pub key_id: KeyId,
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable cause, at most [`MAX_FAILURE_MESSAGE_LEN`] bytes
    pub message: String,
}

impl WireBatchFailure {
    /// Build a failure entry, cutting `message` to [`MAX_FAILURE_MESSAGE_LEN`]
    /// bytes on a char boundary.
    pub fn new(key_id: KeyId, kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_FAILURE_MESSAGE_LEN {
            let mut end = MAX_FAILURE_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self { key_id, kind, message }
    }
}

/// Prekey responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrekeyResponse {
    /// Outcome of a batch. `failures` lists ids that were not issued.
    Generated {
        /// Issued public halves, ascending by id
        prekeys: Vec<WirePrekey>,
        /// Ids that failed, with causes
        failures: Vec<WireBatchFailure>,
    },

    /// One page of live public halves.
    Exported {
        /// Public halves, ascending by id
        prekeys: Vec<WirePrekey>,
        /// Cursor for the next page; absent on the last page
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_after: Option<KeyId>,
    },

    /// The consumed keypair. Never sent twice for the same id.
    Consumed {
        /// Key id
        key_id: KeyId,
        /// Base64 public key
        public_key: String,
        /// Base64 private key
        private_key: String,
    },
}

/// Error answer for any request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable cause
    pub message: String,
}

impl ErrorPayload {
    /// Build an error payload.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Whether the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", content = "body", rename_all = "snake_case")]
pub enum Request {
    /// Session service
    Session(SessionRequest),
    /// Prekey service
    Prekey(PrekeyRequest),
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", content = "body", rename_all = "snake_case")]
pub enum Response {
    /// Session service answer
    Session(SessionResponse),
    /// Prekey service answer
    Prekey(PrekeyResponse),
    /// Failure
    Error(ErrorPayload),
}

impl Request {
    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        encode_cbor(self)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        decode_cbor(bytes)
    }
}

impl Response {
    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        encode_cbor(self)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        decode_cbor(bytes)
    }

    /// Error payload, if this is an error response.
    pub fn error(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Error(payload) => Some(payload),
            Self::Session(_) | Self::Prekey(_) => None,
        }
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::new();
    ciborium::into_writer(value, (&mut buf).writer())
        .map_err(|e| WireError::CborEncode(e.to_string()))?;

    if buf.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge { size: buf.len(), max: MAX_PAYLOAD_SIZE });
    }
    Ok(buf.freeze())
}

// Size check runs before parsing so oversized input never reaches the CBOR
// decoder.
fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge { size: bytes.len(), max: MAX_PAYLOAD_SIZE });
    }
    ciborium::from_reader(bytes).map_err(|e| {
        tracing::debug!(error = %e, len = bytes.len(), "payload decode failed");
        WireError::CborDecode(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(bytes: &[u8]) -> Vec<String> {
        let value: ciborium::Value = ciborium::from_reader(bytes).unwrap();
        let mut names = Vec::new();
        collect_names(&value, &mut names);
        names
    }

    fn collect_names(value: &ciborium::Value, out: &mut Vec<String>) {
        if let Some(map) = value.as_map() {
            for (k, v) in map {
                if let Some(name) = k.as_text() {
                    out.push(name.to_string());
                }
                collect_names(v, out);
            }
        }
    }

    #[test]
    fn session_requests_are_method_tagged() {
        let request = Request::Session(SessionRequest::Create {
            identity: "u1".to_string(),
            email: "a@x.com".to_string(),
            role: "student".to_string(),
            name: None,
        });
        let bytes = request.encode().unwrap();

        let value: ciborium::Value = ciborium::from_reader(bytes.as_ref()).unwrap();
        let body = value
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_text() == Some("body"))
            .map(|(_, v)| v.clone())
            .unwrap();
        let method = body
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_text() == Some("method"))
            .and_then(|(_, v)| v.as_text().map(str::to_string));
        assert_eq!(method.as_deref(), Some("POST"));

        assert!(!field_names(&bytes).contains(&"name".to_string()));
        assert_eq!(Request::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn wire_prekeys_use_camel_case() {
        let response = Response::Prekey(PrekeyResponse::Exported {
            prekeys: vec![WirePrekey { key_id: 1000, public_key: "AAAA".to_string() }],
            next_after: Some(1000),
        });
        let names = field_names(&response.encode().unwrap());
        assert!(names.contains(&"keyId".to_string()));
        assert!(names.contains(&"publicKey".to_string()));
        assert!(names.contains(&"next_after".to_string()));
    }

    #[test]
    fn failure_messages_are_cut_on_a_char_boundary() {
        let long = "é".repeat(MAX_FAILURE_MESSAGE_LEN);
        let failure = WireBatchFailure::new(1, ErrorKind::StorageFailure, long);
        assert!(failure.message.len() <= MAX_FAILURE_MESSAGE_LEN);
        assert!(failure.message.len() >= MAX_FAILURE_MESSAGE_LEN - 1);

        let short = WireBatchFailure::new(1, ErrorKind::InvalidRequest, "already issued");
        assert_eq!(short.message, "already issued");
    }

    #[test]
    fn full_responses_fit_one_frame() {
        let key = "A".repeat(44);
        let generated = Response::Prekey(PrekeyResponse::Generated {
            prekeys: (0..MAX_PREKEYS_PER_RESPONSE as u32)
                .map(|i| WirePrekey { key_id: u32::MAX - i, public_key: key.clone() })
                .collect(),
            failures: Vec::new(),
        });
        assert!(generated.encode().is_ok());

        let failed = Response::Prekey(PrekeyResponse::Generated {
            prekeys: Vec::new(),
            failures: (0..MAX_PREKEYS_PER_RESPONSE as u32)
                .map(|i| {
                    WireBatchFailure::new(u32::MAX - i, ErrorKind::StorageFailure, "x".repeat(500))
                })
                .collect(),
        });
        assert!(failed.encode().is_ok());
    }

    #[test]
    fn generate_defaults_are_optional_on_the_wire() {
        let request = Request::Prekey(PrekeyRequest::Generate {
            identity: "u1".to_string(),
            start_id: None,
            count: None,
        });
        let bytes = request.encode().unwrap();
        assert!(!field_names(&bytes).contains(&"count".to_string()));
        assert_eq!(Request::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let bytes = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            Request::decode(&bytes),
            Err(WireError::PayloadTooLarge { size: MAX_PAYLOAD_SIZE + 1, max: MAX_PAYLOAD_SIZE })
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(Request::decode(&[0xFF, 0x00, 0x13]), Err(WireError::CborDecode(_))));
    }

    #[test]
    fn lookup_view_carries_record_fields() {
        let record = SessionRecord {
            identity: "u1".to_string(),
            attributes: SessionAttributes::new("a@x.com", "student").with_display_name("Ada"),
            created_at_ms: 10,
            expires_at_ms: 20,
        };
        let view = SessionView::from(&record);
        assert_eq!(view.name.as_deref(), Some("Ada"));
        assert_eq!(view.created_at, 10);
        assert_eq!(view.expires_at, 20);
    }

    #[test]
    fn request_identity_accessor() {
        let request = PrekeyRequest::Consume { identity: "bob".to_string(), key_id: 7 };
        assert_eq!(request.identity(), "bob");
        assert_eq!(SessionRequest::Delete { identity: "amy".to_string() }.identity(), "amy");
    }
}
