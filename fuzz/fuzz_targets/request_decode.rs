//! Fuzz target for request and response decoding
//!
//! Feeds arbitrary bytes to the CBOR payload decoders, as a peer would by
//! sending a well-framed but hostile payload.
//!
//! # Invariants
//!
//! - Decoding never panics; invalid input is an error
//! - Input above `MAX_PAYLOAD_SIZE` is rejected before parsing
//! - Anything that decodes re-encodes, and decodes to the same value

#![no_main]

use edgevault_core::{MAX_PAYLOAD_SIZE, Request, Response, WireError};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match Request::decode(data) {
        Ok(request) => {
            let encoded = request.encode().expect("decoded request must re-encode");
            let again = Request::decode(&encoded).expect("re-encoded request must decode");
            assert_eq!(again, request);
        },
        Err(WireError::PayloadTooLarge { size, max }) => {
            assert_eq!(max, MAX_PAYLOAD_SIZE);
            assert!(size > max);
        },
        Err(_) => assert!(data.len() <= MAX_PAYLOAD_SIZE),
    }

    let _ = Response::decode(data);
});
