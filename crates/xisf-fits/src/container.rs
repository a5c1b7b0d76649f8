//! XISF monolithic container framing.
//!
//! A container starts with a fixed 16-byte prologue:
//!
//! | bytes  | content                                        |
//! |--------|------------------------------------------------|
//! | 0..8   | signature and version, `XISF0100`              |
//! | 8..12  | length of the XML header, little-endian `u32`  |
//! | 12..16 | reserved, ignored                              |
//!
//! The XML header follows immediately, and the binary data region begins
//! right after it. Attachment offsets in the XML are absolute positions in
//! the whole stream, so the data region start is only a lower bound.

use crate::endian::read_u32_le;
use crate::error::{Error, Result};

/// Signature and format version of a monolithic XISF 1.0 file.
pub const SIGNATURE: &[u8; 8] = b"XISF0100";

/// Length of the fixed prologue preceding the XML header.
pub const PROLOGUE_LEN: usize = 16;

/// The decoded 16-byte prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Declared length of the XML header in bytes.
    pub header_len: u32,
    /// Reserved field, carried for diagnostics only.
    pub reserved: u32,
}

/// A validated container split into its regions. Borrows the input stream.
#[derive(Debug, Clone, Copy)]
pub struct Container<'a> {
    pub header: ContainerHeader,
    /// The XML header, with trailing NUL and whitespace padding removed.
    pub metadata: &'a [u8],
    /// Offset of the first byte after the XML header.
    pub data_start: usize,
    /// The whole input stream; attachment offsets index into this.
    pub stream: &'a [u8],
}

/// Validate the prologue of `bytes` and split off the XML header.
pub fn read_container(bytes: &[u8]) -> Result<Container<'_>> {
    let probe = bytes.len().min(SIGNATURE.len());
    if bytes[..probe] != SIGNATURE[..probe] {
        let shown = String::from_utf8_lossy(&bytes[..probe]).into_owned();
        return Err(Error::Format(format!(
            "expected signature {:?}, found {:?}",
            String::from_utf8_lossy(SIGNATURE),
            shown
        )));
    }
    if bytes.len() < PROLOGUE_LEN {
        return Err(Error::TruncatedInput {
            what: "container prologue",
            needed: PROLOGUE_LEN,
            available: bytes.len(),
        });
    }

    let header = ContainerHeader {
        header_len: read_u32_le(&bytes[8..12]),
        reserved: read_u32_le(&bytes[12..16]),
    };

    let data_start = PROLOGUE_LEN
        .checked_add(header.header_len as usize)
        .ok_or_else(|| Error::Internal("XML header length overflows usize".into()))?;
    if data_start > bytes.len() {
        return Err(Error::TruncatedInput {
            what: "XML header",
            needed: data_start,
            available: bytes.len(),
        });
    }

    let raw = &bytes[PROLOGUE_LEN..data_start];
    let end = raw
        .iter()
        .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);

    tracing::debug!(
        "XISF container: {} byte XML header, data region at offset {}, {} bytes total",
        header.header_len,
        data_start,
        bytes.len()
    );

    Ok(Container {
        header,
        metadata: &raw[..end],
        data_start,
        stream: bytes,
    })
}
