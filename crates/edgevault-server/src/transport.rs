//! Length-prefixed CBOR framing.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! CBOR payload. One request frame is answered by one response frame, in
//! order, on the same stream.
//!
//! Everything here is generic over `AsyncRead + AsyncWrite`, so the same code
//! serves real TCP sockets and turmoil's simulated ones.

use bytes::BytesMut;
use edgevault_core::{
    Environment, ErrorKind, ErrorPayload, MAX_PAYLOAD_SIZE, Request, Response,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{error::ServerError, handler::RequestHandler, storage::Storage};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closes the stream between frames.
///
/// # Errors
///
/// `Protocol` if the declared length exceeds [`MAX_PAYLOAD_SIZE`];
/// `Transport` if the stream ends mid-frame or fails.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<BytesMut>, ServerError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ServerError::Protocol(format!(
            "frame of {len} bytes exceeds limit of {MAX_PAYLOAD_SIZE}"
        )));
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ServerError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ServerError::Protocol(format!(
            "frame of {} bytes exceeds limit of {MAX_PAYLOAD_SIZE}",
            payload.len()
        )));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Send one request and wait for its response.
pub async fn call<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut T,
    request: &Request,
) -> Result<Response, ServerError> {
    write_frame(stream, &request.encode()?).await?;

    let payload = read_frame(stream)
        .await?
        .ok_or_else(|| ServerError::Transport("connection closed before response".to_string()))?;
    Ok(Response::decode(&payload)?)
}

/// Serve requests on one connection until the peer closes it.
///
/// A payload that fails to decode is answered with an `InvalidRequest` error
/// and the connection continues, as is a response too large to encode; a
/// framing error ends the connection.
pub async fn serve_connection<T, E, S>(
    mut stream: T,
    handler: RequestHandler<E, S>,
    connection_id: u64,
) -> Result<(), ServerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
    S: Storage,
{
    tracing::debug!(connection_id, "connection opened");

    while let Some(payload) = read_frame(&mut stream).await? {
        let response = match Request::decode(&payload) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "request decode failed");
                Response::Error(ErrorPayload::new(ErrorKind::InvalidRequest, e.to_string()))
            },
        };

        let encoded = match response.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(connection_id, error = %e, "response encode failed");
                Response::Error(ErrorPayload::new(
                    ErrorKind::InvalidRequest,
                    format!("response not sent: {e}"),
                ))
                .encode()?
            },
        };
        write_frame(&mut stream, &encoded).await?;
    }

    tracing::debug!(connection_id, "connection closed");
    Ok(())
}
