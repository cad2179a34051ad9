use std::io::{Read, Write};

use crate::error::{TransportError, TransportResult};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Frame header: 4-byte big-endian payload length.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Write one length-prefixed frame: `[4 bytes BE length][payload]`.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> TransportResult<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Blocks until the full frame has arrived; a connection closed mid-frame
/// surfaces as an I/O error from `read_exact`.
pub fn read_frame<R: Read>(reader: &mut R) -> TransportResult<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
