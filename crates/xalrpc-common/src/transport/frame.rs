//! Frame layout:
//!
//! ```text
//! byte 0   FIN bit, 3 reserved bits, 4-bit opcode
//! byte 1   MASK bit, 7-bit length code
//!          length code 126: next 2 bytes are the length (big-endian)
//!          length code 127: next 8 bytes are the length (big-endian)
//! [4-byte mask key when MASK is set]
//! payload, XOR-ed with mask[i % 4] when masked
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::transport::error::TransportError;

/// Maximum accepted payload of a single frame or reassembled message (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(code: u8) -> Result<Self, TransportError> {
        match code {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(TransportError::Protocol(format!("unknown opcode {:#x}", other))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Serializes one frame, masking the payload when a mask is given.
pub fn encode_frame(fin: bool, opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    let first = (if fin { FIN_BIT } else { 0 }) | opcode.as_u8();
    out.push(first);

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    let len = payload.len();
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(mask) => {
            out.extend_from_slice(&mask);
            let start = out.len();
            out.extend_from_slice(payload);
            apply_mask(&mut out[start..], mask);
        }
        None => out.extend_from_slice(payload),
    }
    out
}

/// Writes a single final frame and flushes.
pub async fn write_frame<W>(
    writer: &mut W,
    opcode: Opcode,
    payload: &[u8],
    mask: Option<[u8; 4]>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(true, opcode, payload, mask);
    writer
        .write_all(&frame)
        .await
        .map_err(|e| TransportError::from_io(e, "writing frame"))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::from_io(e, "flushing frame"))?;
    Ok(())
}

/// Reads one frame.
///
/// # Errors
///
/// End of stream anywhere inside the frame is `ConnectionDropped`; a length
/// above [`MAX_MESSAGE_SIZE`] is refused before the payload is read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| TransportError::from_io(e, "reading frame header"))?;

    let fin = header[0] & FIN_BIT != 0;
    let opcode = Opcode::from_u8(header[0] & 0x0F)?;
    let masked = header[1] & MASK_BIT != 0;

    let len = match header[1] & 0x7F {
        126 => {
            let mut buf = [0u8; 2];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| TransportError::from_io(e, "reading frame length"))?;
            u16::from_be_bytes(buf) as u64
        }
        127 => {
            let mut buf = [0u8; 8];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| TransportError::from_io(e, "reading frame length"))?;
            u64::from_be_bytes(buf)
        }
        short => short as u64,
    };
    if len > MAX_MESSAGE_SIZE as u64 {
        return Err(TransportError::MessageTooLarge {
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        reader
            .read_exact(&mut key)
            .await
            .map_err(|e| TransportError::from_io(e, "reading frame mask"))?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| TransportError::from_io(e, "reading frame payload"))?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}
