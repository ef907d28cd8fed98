//! Record framing for row files.
//!
//! Each tuple is stored as a fixed header followed by its bincode payload:
//!
//! ```text
//! magic u32 | version u16 | flags u16 | len u32 | crc32 u32 | payload[len]
//! ```
//!
//! All integers are little endian. Fragment boundaries always fall on a
//! header, so a scanner can start decoding at any fragment start.

use crate::{record::Tuple, storage::StorageError};

/// Magic constant identifying row-file frames (`"TSRW"`).
pub(crate) const FRAME_MAGIC: u32 = 0x5453_5257;

pub(crate) const FRAME_VERSION: u16 = 1;

pub(crate) const FRAME_HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4;

/// Header prepended to every tuple on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub(crate) magic: u32,
    pub(crate) version: u16,
    /// Reserved, always zero in version 1.
    pub(crate) flags: u16,
    pub(crate) len: u32,
    /// CRC32 of the payload bytes only.
    pub(crate) crc32: u32,
}

impl FrameHeader {
    fn for_payload(payload: &[u8]) -> Result<Self, StorageError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::Codec("tuple larger than 4GiB".to_string()))?;
        Ok(FrameHeader {
            magic: FRAME_MAGIC,
            version: FRAME_VERSION,
            flags: 0,
            len,
            crc32: crc32fast::hash(payload),
        })
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
    }

    pub(crate) fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<Self, StorageError> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != FRAME_MAGIC {
            return Err(StorageError::Corrupt("frame magic mismatch"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FRAME_VERSION {
            return Err(StorageError::Corrupt("unsupported frame version"));
        }
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        if flags != 0 {
            return Err(StorageError::Corrupt("unknown frame flags"));
        }
        let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let crc32 = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        Ok(FrameHeader {
            magic,
            version,
            flags,
            len,
            crc32,
        })
    }

    /// Bytes this frame occupies on disk, header included.
    pub(crate) fn frame_len(&self) -> u64 {
        FRAME_HEADER_SIZE as u64 + u64::from(self.len)
    }

    pub(crate) fn verify(&self, payload: &[u8]) -> Result<(), StorageError> {
        if crc32fast::hash(payload) != self.crc32 {
            return Err(StorageError::Corrupt("frame payload crc32 mismatch"));
        }
        Ok(())
    }
}

/// Append the framed encoding of `tuple` to `buf`, returning the bytes added.
pub(crate) fn encode_tuple(tuple: &Tuple, buf: &mut Vec<u8>) -> Result<usize, StorageError> {
    let payload = bincode::serialize(tuple)?;
    let header = FrameHeader::for_payload(&payload)?;
    let before = buf.len();
    header.encode_into(buf);
    buf.extend_from_slice(&payload);
    Ok(buf.len() - before)
}

pub(crate) fn decode_payload(payload: &[u8]) -> Result<Tuple, StorageError> {
    Ok(bincode::deserialize(payload)?)
}
