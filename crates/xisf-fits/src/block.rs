//! 2880-byte record layout of the FITS output.

pub const BLOCK_SIZE: usize = 2880;

pub const CARD_SIZE: usize = 80;

pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// What a partial trailing record is filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// ASCII spaces after the `END` card.
    Header,
    /// Zero bytes after the last sample.
    Data,
}

impl Fill {
    pub const fn byte(self) -> u8 {
        match self {
            Fill::Header => b' ',
            Fill::Data => 0,
        }
    }
}

/// Length of `len` bytes rounded up to whole records.
pub const fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Grow `buf` to a record boundary. An empty buffer stays empty.
pub fn pad_to_block(buf: &mut Vec<u8>, fill: Fill) {
    buf.resize(padded_len(buf.len()), fill.byte());
}
