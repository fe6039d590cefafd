//! Metadata file codec
//!
//! Schemas and fragment metadata are persisted with the same framing.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (6 bytes)                            │
//! │   Magic: "MSDB" (4) | Version: u16 (2)      │
//! ├─────────────────────────────────────────────┤
//! │ Body (variable)                             │
//! │   bincode-encoded value                     │
//! ├─────────────────────────────────────────────┤
//! │ Footer (4 bytes)                            │
//! │   BodyCRC: u32                              │
//! └─────────────────────────────────────────────┘
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MosaicError, Result};

/// Magic bytes identifying a MosaicDB metadata file
pub(crate) const MAGIC: &[u8; 4] = b"MSDB";

/// Current metadata format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2)
pub(crate) const HEADER_SIZE: usize = 6;

/// Footer size: BodyCRC (4)
pub(crate) const FOOTER_SIZE: usize = 4;

/// Frame a serializable value
pub(crate) fn encode_checksummed<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(value)?;
    let crc = crc32fast::hash(&body);

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + FOOTER_SIZE);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Unframe a value, optionally verifying the body checksum
pub(crate) fn decode_checksummed<T: DeserializeOwned>(bytes: &[u8], verify: bool) -> Result<T> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(MosaicError::Corruption(format!(
            "Metadata file too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(MosaicError::Corruption(format!(
            "Invalid metadata magic: expected MSDB, got {:?}",
            &bytes[0..4]
        )));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(MosaicError::Corruption(format!(
            "Unsupported metadata version: {}",
            version
        )));
    }

    let body = &bytes[HEADER_SIZE..bytes.len() - FOOTER_SIZE];
    if verify {
        let footer = &bytes[bytes.len() - FOOTER_SIZE..];
        let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(MosaicError::Corruption(format!(
                "Metadata checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }
    }
    Ok(bincode::deserialize(body)?)
}
