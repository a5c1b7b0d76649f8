//! Locating an image's raw data block.
//!
//! Attachments borrow directly from the input stream. Inline and embedded
//! blocks are text-encoded inside the XML and are decoded into an owned
//! buffer.

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Error, Result};
use crate::metadata::{DataLocation, InlineEncoding};

/// Return the raw (possibly compressed) data block of image `image`.
///
/// `data_start` is the first byte after the XML header. An attachment must
/// lie entirely within `[data_start, stream.len())`.
pub fn resolve<'s>(
    location: &DataLocation,
    stream: &'s [u8],
    data_start: usize,
    image: usize,
) -> Result<Cow<'s, [u8]>> {
    match location {
        &DataLocation::Attachment { offset, length } => {
            let out_of_bounds = || Error::DataBounds {
                image,
                offset,
                length,
                data_start,
                stream_len: stream.len(),
            };
            if offset < data_start {
                return Err(out_of_bounds());
            }
            let end = offset.checked_add(length).ok_or_else(out_of_bounds)?;
            let block = stream.get(offset..end).ok_or_else(out_of_bounds)?;
            tracing::debug!(
                "image {}: attachment of {} bytes at offset {}",
                image,
                length,
                offset
            );
            Ok(Cow::Borrowed(block))
        }
        DataLocation::Inline { encoding, text } | DataLocation::Embedded { encoding, text } => {
            decode_text(*encoding, text, image).map(Cow::Owned)
        }
    }
}

fn decode_text(encoding: InlineEncoding, text: &str, image: usize) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match encoding {
        InlineEncoding::Base64 => BASE64
            .decode(compact.as_bytes())
            .map_err(|e| Error::metadata(Some(image), "location", format!("bad base64 data: {e}"))),
        InlineEncoding::Hex => decode_hex(compact.as_bytes())
            .ok_or_else(|| Error::metadata(Some(image), "location", "bad hex data")),
    }
}

fn decode_hex(digits: &[u8]) -> Option<Vec<u8>> {
    fn nibble(d: u8) -> Option<u8> {
        match d {
            b'0'..=b'9' => Some(d - b'0'),
            b'a'..=b'f' => Some(d - b'a' + 10),
            b'A'..=b'F' => Some(d - b'A' + 10),
            _ => None,
        }
    }

    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}
