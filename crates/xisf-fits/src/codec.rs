//! Reversing XISF block compression and byte shuffling.
//!
//! Every decoder is bounded at one byte beyond the declared size, so a
//! stream that inflates to more than it declared is caught without being
//! materialized in full.

use std::borrow::Cow;

use miniz_oxide::inflate::{self, TINFLStatus};

use crate::error::{Error, Result};
use crate::metadata::{Codec, Compression};

/// Decode a raw data block into exactly `expected` bytes of pixel data.
///
/// Uncompressed blocks pass through untouched but must already have the
/// expected size.
pub fn decode<'a>(
    raw: Cow<'a, [u8]>,
    compression: Option<&Compression>,
    expected: usize,
    image: usize,
) -> Result<Cow<'a, [u8]>> {
    let Some(compression) = compression else {
        if raw.len() != expected {
            return Err(Error::Validation {
                image,
                field: "uncompressed data block",
                expected,
                actual: raw.len(),
            });
        }
        return Ok(raw);
    };

    let codec = compression.codec;
    let out = match codec {
        Codec::Zlib => inflate_zlib(&raw, expected, image)?,
        Codec::Gzip => inflate_gzip(&raw, expected, image)?,
        Codec::Lz4 | Codec::Lz4Hc => lz4_block(&raw, codec, expected, image)?,
        Codec::Zstd => {
            return Err(Error::UnsupportedCodec {
                image,
                codec: compression.label(),
            })
        }
    };

    if out.len() != expected {
        return Err(Error::Validation {
            image,
            field: "decompressed",
            expected,
            actual: out.len(),
        });
    }

    tracing::debug!(
        "image {}: {} decoded {} -> {} bytes",
        image,
        compression.label(),
        raw.len(),
        out.len()
    );

    Ok(Cow::Owned(match compression.shuffle {
        Some(width) => unshuffle(&out, width),
        None => out,
    }))
}

/// A size mismatch where the stream held at least one byte too many.
fn overlong(image: usize, expected: usize) -> Error {
    Error::Validation {
        image,
        field: "decompressed",
        expected,
        actual: expected + 1,
    }
}

fn inflate_error(image: usize, codec: Codec, expected: usize, err: inflate::DecompressError) -> Error {
    match err.status {
        TINFLStatus::HasMoreOutput => overlong(image, expected),
        _ => Error::Decompression {
            image,
            codec: codec.name(),
            reason: err.to_string(),
        },
    }
}

fn inflate_zlib(data: &[u8], expected: usize, image: usize) -> Result<Vec<u8>> {
    inflate::decompress_to_vec_zlib_with_limit(data, expected.saturating_add(1))
        .map_err(|e| inflate_error(image, Codec::Zlib, expected, e))
}

fn inflate_gzip(data: &[u8], expected: usize, image: usize) -> Result<Vec<u8>> {
    let payload = strip_gzip_header(data).ok_or_else(|| Error::Decompression {
        image,
        codec: Codec::Gzip.name(),
        reason: "malformed gzip member header".into(),
    })?;
    inflate::decompress_to_vec_with_limit(payload, expected.saturating_add(1))
        .map_err(|e| inflate_error(image, Codec::Gzip, expected, e))
}

/// Strip the gzip member header and trailer, returning the raw deflate
/// payload.
fn strip_gzip_header(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 18 || data[0] != 0x1f || data[1] != 0x8b || data[2] != 0x08 {
        return None;
    }
    let flg = data[3];
    let mut pos = 10usize;
    if flg & 0x04 != 0 {
        // FEXTRA
        let xlen = u16::from_le_bytes([*data.get(pos)?, *data.get(pos + 1)?]) as usize;
        pos += 2 + xlen;
    }
    for mask in [0x08, 0x10] {
        // FNAME, FCOMMENT: null-terminated
        if flg & mask != 0 {
            pos += data.get(pos..)?.iter().position(|&b| b == 0)? + 1;
        }
    }
    if flg & 0x02 != 0 {
        // FHCRC
        pos += 2;
    }
    // 8-byte trailer: CRC32 + ISIZE
    if data.len() < pos + 8 {
        return None;
    }
    Some(&data[pos..data.len() - 8])
}

fn lz4_block(data: &[u8], codec: Codec, expected: usize, image: usize) -> Result<Vec<u8>> {
    use lz4_flex::block::DecompressError;

    lz4_flex::block::decompress(data, expected).map_err(|e| match e {
        DecompressError::OutputTooSmall { .. } => overlong(image, expected),
        other => Error::Decompression {
            image,
            codec: codec.name(),
            reason: other.to_string(),
        },
    })
}

/// Reverse the byte shuffle of `width`-byte items.
///
/// For `n` whole items, byte `b` of item `i` is read from `b * n + i` and
/// written to `i * width + b`. Trailing bytes that do not form a whole item
/// are copied unchanged.
pub fn unshuffle(input: &[u8], width: usize) -> Vec<u8> {
    if width <= 1 || input.len() < width {
        return input.to_vec();
    }
    let n = input.len() / width;
    let body = n * width;
    let mut out = vec![0u8; input.len()];
    for (b, plane) in input[..body].chunks_exact(n).enumerate() {
        for (i, &byte) in plane.iter().enumerate() {
            out[i * width + b] = byte;
        }
    }
    out[body..].copy_from_slice(&input[body..]);
    out
}

/// Byte-shuffle `width`-byte items; the inverse of [`unshuffle`].
pub fn shuffle(input: &[u8], width: usize) -> Vec<u8> {
    if width <= 1 || input.len() < width {
        return input.to_vec();
    }
    let n = input.len() / width;
    let body = n * width;
    let mut out = vec![0u8; input.len()];
    for (i, item) in input[..body].chunks_exact(width).enumerate() {
        for (b, &byte) in item.iter().enumerate() {
            out[b * n + i] = byte;
        }
    }
    out[body..].copy_from_slice(&input[body..]);
    out
}
