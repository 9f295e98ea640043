//! Edgevault core types.
//!
//! Pure data and codecs shared by the server and the simulation harness:
//! session records, prekey material, the key codec, configuration, and the
//! CBOR wire payloads. Nothing here performs I/O; time and randomness come in
//! through [`Environment`].
//!
//! # Components
//!
//! - [`SessionRecord`]: per-identity authentication session with sliding expiry
//! - [`PrekeyPair`] / [`PublicPrekey`]: one-time X25519 prekeys
//! - [`codec`]: base64 key encoding for transport
//! - [`EdgeConfig`]: recognized configuration options
//! - [`payloads`]: request and response envelopes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod payloads;
pub mod prekey;
pub mod session;

pub use codec::{CodecError, decode_key, decode_key_array, encode_key};
pub use config::{ConfigError, EdgeConfig};
pub use env::Environment;
pub use error::ErrorKind;
pub use payloads::{
    ErrorPayload, MAX_FAILURE_MESSAGE_LEN, MAX_PAYLOAD_SIZE, MAX_PREKEYS_PER_RESPONSE,
    PrekeyRequest, PrekeyResponse, Request, Response, SessionRequest, SessionResponse,
    SessionView, WireBatchFailure, WireError, WirePrekey,
};
pub use prekey::{KEY_LEN, KeyId, PrekeyPair, PrivateKey, PublicPrekey};
pub use session::{MAX_IDENTITY_LEN, SessionAttributes, SessionRecord, SessionStatus};
