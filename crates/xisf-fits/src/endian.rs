//! Byte-order conversion between XISF (little-endian by default) and FITS
//! (always big-endian).
//!
//! The bulk routines work on raw byte buffers **in place**, one element of
//! `width` bytes at a time, so they serve every sample type alike. A width of
//! 1 is always a no-op.

/// Read a little-endian `u32` from the first 4 bytes of the slice.
#[inline]
pub fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Reverse the byte order of every `width`-byte element of `buf`.
///
/// # Panics
/// Panics if `width` is zero or `buf.len()` is not a multiple of `width`.
pub fn swap_each(buf: &mut [u8], width: usize) {
    assert!(
        width > 0 && buf.len() % width == 0,
        "buffer length must be a multiple of the element width"
    );
    if width == 1 {
        return;
    }
    for chunk in buf.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

/// Convert a buffer of little-endian elements to native endianness in place.
/// On little-endian hosts this is a no-op.
pub fn le_to_native(buf: &mut [u8], width: usize) {
    if cfg!(target_endian = "big") {
        swap_each(buf, width);
    }
}

/// Convert a buffer of big-endian elements to native endianness in place.
/// On big-endian hosts this is a no-op.
pub fn be_to_native(buf: &mut [u8], width: usize) {
    if cfg!(target_endian = "little") {
        swap_each(buf, width);
    }
}

/// Convert a buffer of native-endian elements to big-endian in place.
/// On big-endian hosts this is a no-op.
pub fn native_to_be(buf: &mut [u8], width: usize) {
    if cfg!(target_endian = "little") {
        swap_each(buf, width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_le_basic() {
        assert_eq!(read_u32_le(&[0x78, 0x56, 0x34, 0x12, 0xFF]), 0x1234_5678);
    }

    #[test]
    fn swap_each_width_two() {
        let mut buf = [1u8, 2, 3, 4];
        swap_each(&mut buf, 2);
        assert_eq!(buf, [2, 1, 4, 3]);
    }

    #[test]
    fn swap_each_width_eight() {
        let mut buf: Vec<u8> = (0..16).collect();
        swap_each(&mut buf, 8);
        assert_eq!(&buf[..8], &[7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(&buf[8..], &[15, 14, 13, 12, 11, 10, 9, 8]);
    }

    #[test]
    fn swap_each_width_one_is_identity() {
        let mut buf = [9u8, 8, 7];
        swap_each(&mut buf, 1);
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    #[should_panic(expected = "multiple of the element width")]
    fn swap_each_ragged_buffer_panics() {
        let mut buf = [0u8; 5];
        swap_each(&mut buf, 2);
    }

    #[test]
    fn native_to_be_matches_to_be_bytes() {
        let values = [1.5f32, -2.25, 1.0e-7];
        let mut buf: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        native_to_be(&mut buf, 4);
        let expected: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        assert_eq!(buf, expected);
    }

    #[test]
    fn le_and_be_to_native() {
        let mut le = 0x0102_0304u32.to_le_bytes();
        le_to_native(&mut le, 4);
        assert_eq!(u32::from_ne_bytes(le), 0x0102_0304);

        let mut be = 0x0102_0304u32.to_be_bytes();
        be_to_native(&mut be, 4);
        assert_eq!(u32::from_ne_bytes(be), 0x0102_0304);
    }
}
