//! Tagged, length-prefixed stream framing.

use std::io::{self, Read, Write};

use crate::client::Framing;

use super::FrameError;

const TEXT_TAG: u8 = 0;
const BINARY_TAG: u8 = 1;

/// Tag byte plus little-endian `u32` length.
pub const FRAME_HEADER_BYTES: usize = 5;

/// Reads one frame, returning `None` on a clean end of stream.
///
/// # Errors
///
/// Returns [`FrameError`] for unknown tags, oversized payloads, streams that
/// end inside a frame, and IO failures.
pub fn read_frame(
    reader: &mut impl Read,
    max_bytes: usize,
) -> Result<Option<(Framing, Vec<u8>)>, FrameError> {
    let mut header = [0_u8; FRAME_HEADER_BYTES];
    if read_with_retry(reader, &mut header[..1])? == 0 {
        return Ok(None);
    }
    read_exact_or_truncated(reader, &mut header[1..])?;

    let framing = match header[0] {
        TEXT_TAG => Framing::Text,
        BINARY_TAG => Framing::Binary,
        tag => return Err(FrameError::UnknownTag { tag }),
    };
    let [_, length @ ..] = header;
    let size = usize::try_from(u32::from_le_bytes(length)).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(FrameError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut payload = vec![0_u8; size];
    read_exact_or_truncated(reader, &mut payload)?;
    Ok(Some((framing, payload)))
}

/// Writes one frame and flushes the writer.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] when the payload length does not fit the
/// header, or [`FrameError::Io`] when writing fails.
pub fn write_frame(
    writer: &mut impl Write,
    framing: Framing,
    payload: &[u8],
) -> Result<(), FrameError> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;
    let tag = match framing {
        Framing::Text => TEXT_TAG,
        Framing::Binary => BINARY_TAG,
    };
    let mut header = [tag, 0, 0, 0, 0];
    header[1..].copy_from_slice(&length.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

fn read_with_retry(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn read_exact_or_truncated(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), FrameError> {
    reader.read_exact(buf).map_err(|error| {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io { source: error }
        }
    })
}
