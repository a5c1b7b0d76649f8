//! FITS header cards: construction, 80-byte serialization, and read-back.

use core::str;

use crate::block::{pad_to_block, Fill, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
use crate::value::{format_value, parse_value, Value, VALUE_FIELD_LEN};

// ── Types ──

/// One 80-byte FITS keyword record.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The value, if this card has a value indicator (`= ` in bytes 8..10).
    pub value: Option<Value>,
    /// An optional comment, or the free text of a commentary card.
    pub comment: Option<String>,
}

/// Pad a short keyword name to 8 bytes with trailing ASCII spaces.
pub const fn kw(name: &[u8]) -> [u8; 8] {
    let mut buf = [b' '; 8];
    let mut i = 0;
    while i < name.len() && i < 8 {
        buf[i] = name[i];
        i += 1;
    }
    buf
}

/// Returns `true` if `name` is a legal FITS keyword: 1 to 8 characters from
/// `A-Z`, `0-9`, `-` and `_`.
pub fn is_valid_keyword(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 8
        && name
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_'))
}

impl Card {
    /// A valued card. `name` is truncated to 8 bytes.
    pub fn new(name: &str, value: Value, comment: Option<&str>) -> Self {
        Card {
            keyword: kw(name.as_bytes()),
            value: Some(value),
            comment: comment.map(String::from),
        }
    }

    /// A card without a value indicator (COMMENT, HISTORY, blank).
    pub fn commentary(name: &str, text: &str) -> Self {
        Card {
            keyword: kw(name.as_bytes()),
            value: None,
            comment: Some(text.to_string()),
        }
    }

    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        &self.keyword == b"END     "
    }

    /// Returns `true` for COMMENT, HISTORY and blank keywords.
    pub fn is_commentary(&self) -> bool {
        matches!(self.keyword_str(), "COMMENT" | "HISTORY" | "")
    }
}

/// Find the first card with the given keyword.
pub fn find_card<'a>(cards: &'a [Card], keyword: &str) -> Option<&'a Card> {
    cards.iter().find(|c| c.keyword_str() == keyword)
}

/// Value of the first integer card with the given keyword.
pub fn find_integer(cards: &[Card], keyword: &str) -> Option<i64> {
    match find_card(cards, keyword)?.value {
        Some(Value::Integer(n)) => Some(n),
        _ => None,
    }
}

// ── Writing ──

/// Serialize a [`Card`] into an 80-byte FITS card image.
pub fn format_card(card: &Card) -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(&card.keyword);

    match (&card.value, &card.comment) {
        (Some(value), comment) => {
            buf[8] = b'=';
            buf[9] = b' ';
            let mut field = format_value(value);
            if let Some(comment) = comment {
                insert_comment(&mut field, comment);
            }
            buf[10..].copy_from_slice(&field);
        }
        (None, Some(text)) => {
            let bytes = text.as_bytes();
            let len = bytes.len().min(CARD_SIZE - 8);
            buf[8..8 + len].copy_from_slice(&bytes[..len]);
        }
        (None, None) => {}
    }

    buf
}

/// Insert a ` / comment` string after the value in a 70-byte value field.
///
/// The comment is dropped when fewer than four bytes remain.
fn insert_comment(field: &mut [u8; VALUE_FIELD_LEN], comment: &str) {
    let content_end = field
        .iter()
        .rposition(|&b| b != b' ')
        .map(|i| i + 1)
        .unwrap_or(0)
        .max(20);

    let sep_start = content_end + 1;
    if sep_start + 3 >= VALUE_FIELD_LEN {
        return;
    }

    field[sep_start] = b'/';
    field[sep_start + 1] = b' ';

    let comment_start = sep_start + 2;
    let bytes = comment.as_bytes();
    let len = bytes.len().min(VALUE_FIELD_LEN - comment_start);
    field[comment_start..comment_start + len].copy_from_slice(&bytes[..len]);
}

/// Create the standard FITS END card.
pub fn format_end_card() -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..3].copy_from_slice(b"END");
    buf
}

/// Serialize header cards into complete FITS header blocks.
///
/// Appends the END card and pads the final block with spaces. The returned
/// length is always a multiple of [`BLOCK_SIZE`].
pub fn serialize_header(cards: &[Card]) -> Vec<u8> {
    let mut buf = Vec::with_capacity((cards.len() + 1).div_ceil(CARDS_PER_BLOCK) * BLOCK_SIZE);
    for card in cards {
        buf.extend_from_slice(&format_card(card));
    }
    buf.extend_from_slice(&format_end_card());
    pad_to_block(&mut buf, Fill::Header);
    buf
}

// ── Reading ──

/// Parse a single 80-byte card image. Returns `None` for an illegal keyword
/// or non-UTF-8 text.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Option<Card> {
    let mut keyword = [b' '; 8];
    keyword.copy_from_slice(&card_bytes[..8]);

    if !keyword
        .iter()
        .all(|&b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_'))
    {
        return None;
    }

    let card = Card {
        keyword,
        value: None,
        comment: None,
    };
    if card.is_end() {
        return Some(card);
    }

    if !card.is_commentary() && &card_bytes[8..10] == b"= " {
        let (value, comment) = match parse_value(&card_bytes[10..]) {
            Some((v, c)) => (Some(v), c.map(String::from)),
            None => (None, None),
        };
        return Some(Card {
            value,
            comment,
            ..card
        });
    }

    let text = str::from_utf8(&card_bytes[8..]).ok()?.trim_end();
    Some(Card {
        comment: (!text.is_empty()).then(|| text.to_string()),
        ..card
    })
}

/// Parse header blocks up to and including the END card.
///
/// Returns the cards (END included) and the header length in bytes, which
/// is a whole number of blocks. Returns `None` if no END card is found in
/// the complete blocks of `data`.
pub fn parse_header_blocks(data: &[u8]) -> Option<(Vec<Card>, usize)> {
    let mut cards = Vec::new();
    for (index, chunk) in data.chunks_exact(CARD_SIZE).enumerate() {
        if index / CARDS_PER_BLOCK >= data.len() / BLOCK_SIZE {
            break;
        }
        let card = parse_card(chunk.try_into().ok()?)?;
        let is_end = card.is_end();
        cards.push(card);
        if is_end {
            let header_len = (index / CARDS_PER_BLOCK + 1) * BLOCK_SIZE;
            return Some((cards, header_len));
        }
    }
    None
}
