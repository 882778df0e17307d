//! Helpers for exchanging length-prefixed messages over a byte stream

use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

/// Errors raised while framing messages.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("stream closed after {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("could not encode or decode message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Length prefix: a big-endian u32.
const PREFIX_LEN: usize = 4;

/// Writes `payload` preceded by its length.
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()?;
    trace!(len, "wrote frame");
    Ok(())
}

/// Reads exactly `len` bytes, looping over short reads.
pub fn read_exact<R: Read>(stream: &mut R, len: usize) -> Result<Vec<u8>, FramingError> {
    let mut buf = vec![0u8; len];
    let mut received = 0;
    while received < len {
        match stream.read(&mut buf[received..]) {
            Ok(0) => {
                return Err(FramingError::Truncated {
                    expected: len,
                    received,
                })
            }
            Ok(n) => received += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(buf)
}

/// Reads one frame, refusing frames longer than `max_len`.
pub fn read_frame<R: Read>(stream: &mut R, max_len: usize) -> Result<Vec<u8>, FramingError> {
    let prefix = read_exact(stream, PREFIX_LEN)?;
    let mut len = [0u8; PREFIX_LEN];
    len.copy_from_slice(&prefix);
    let len = u32::from_be_bytes(len) as usize;
    if len > max_len {
        return Err(FramingError::TooLarge { len, max: max_len });
    }
    let payload = read_exact(stream, len)?;
    trace!(len, "read frame");
    Ok(payload)
}

/// Serializes `message` as JSON and writes it as one frame.
pub fn send_message<W: Write, T: Serialize>(
    stream: &mut W,
    message: &T,
) -> Result<(), FramingError> {
    let payload = serde_json::to_vec(message)?;
    write_frame(stream, &payload)
}

/// Reads one frame and deserializes it from JSON.
pub fn recv_message<R: Read, T: DeserializeOwned>(
    stream: &mut R,
    max_len: usize,
) -> Result<T, FramingError> {
    let payload = read_frame(stream, max_len)?;
    Ok(serde_json::from_slice(&payload)?)
}
