//! FITS primary HDU assembly for a reconstructed XISF image.
//!
//! Header cards are produced in a fixed order:
//!
//! 1. mandatory structure: `SIMPLE`, `BITPIX`, `NAXIS`, `NAXISn`, `EXTEND`
//! 2. scaling: `BZERO`, `BSCALE`
//! 3. provenance: `ORIGIN`, `XISFFILE`, `XISFFMT`, `XISFGEOM`, `XISFCOMP`,
//!    `XISFCSPC`, `XISFDIMn`
//! 4. the source `FITSKeyword` records, in order
//! 5. allow-listed XISF properties
//!
//! `END` and block padding are added by [`write_fits`].

use std::collections::HashSet;

use crate::block::{pad_to_block, Fill};
use crate::convert::Warning;
use crate::error::{Error, Result};
use crate::header::{is_valid_keyword, serialize_header, Card};
use crate::metadata::{ImageDescriptor, KeywordRecord, PropertyRecord, PropertyValue};
use crate::pixel::PixelBuffer;
use crate::value::{is_fits_literal, value_overflows, Value};

/// Value of the `ORIGIN` card.
pub const ORIGIN: &str = concat!("xisf-fits ", env!("CARGO_PKG_VERSION"));

/// Widest commentary text on one card.
const COMMENTARY_LEN: usize = 72;

/// XISF properties promoted to header cards.
pub const PROPERTY_CARDS: &[(&str, &str)] = &[
    ("XISF:CreatorApplication", "SWCREATE"),
    ("XISF:CreatorModule", "SWMODULE"),
    ("XISF:CreationTime", "DATE"),
    ("Observation:Observer:Name", "OBSERVER"),
    ("Observation:Object:Name", "OBJECT"),
    ("XISF:Description", "COMMENT"),
    ("Observation:Description", "COMMENT"),
];

/// Highest `n` whose `XISFDIMn` still fits an 8-character keyword.
const MAX_DIM_CARDS: usize = 9;

/// FITS axis lengths, `NAXIS1` first: the spatial dimensions, then the
/// channel count when there is more than one channel.
pub fn fits_axes(dimensions: &[usize], channel_count: usize) -> Vec<usize> {
    let mut axes = dimensions.to_vec();
    if channel_count > 1 {
        axes.push(channel_count);
    }
    axes
}

/// Returns `true` for keywords whose value this emitter owns.
fn is_structural(name: &str) -> bool {
    match name {
        "SIMPLE" | "BITPIX" | "NAXIS" | "EXTEND" | "BZERO" | "BSCALE" | "END" => true,
        _ => name
            .strip_prefix("NAXIS")
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit())),
    }
}

/// Replace anything outside printable ASCII, which FITS headers cannot hold.
fn ascii_text(text: &str) -> String {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect()
}

/// Push a valued card, recording a warning if its value will be truncated.
fn push_valued(
    cards: &mut Vec<Card>,
    warnings: &mut Vec<Warning>,
    name: &str,
    value: Value,
    comment: Option<&str>,
) {
    if value_overflows(&value) {
        warnings.push(Warning::ValueTruncated {
            keyword: name.to_string(),
        });
    }
    cards.push(Card::new(name, value, comment));
}

/// Push commentary text, split over as many cards as it needs.
fn push_commentary(cards: &mut Vec<Card>, name: &str, text: &str) {
    let text = ascii_text(text);
    if text.is_empty() {
        cards.push(Card::commentary(name, ""));
        return;
    }
    for piece in text.as_bytes().chunks(COMMENTARY_LEN) {
        // ascii_text guarantees single-byte characters
        cards.push(Card::commentary(name, &String::from_utf8_lossy(piece)));
    }
}

fn keyword_card(
    record: &KeywordRecord,
    cards: &mut Vec<Card>,
    warnings: &mut Vec<Warning>,
) -> Option<String> {
    let name = record.name.trim();
    let skip = |reason: &'static str| Warning::KeywordSkipped {
        name: name.to_string(),
        reason,
    };
    if !is_valid_keyword(name) {
        warnings.push(skip("not a valid FITS keyword"));
        return None;
    }
    if is_structural(name) {
        warnings.push(skip("structural keyword is written by the converter"));
        return None;
    }

    let value = ascii_text(record.value.trim());
    let comment = ascii_text(record.comment.trim());

    if matches!(name, "COMMENT" | "HISTORY") {
        let text = match (value.is_empty(), comment.is_empty()) {
            (true, _) => comment,
            (false, true) => value,
            (false, false) => format!("{value} {comment}"),
        };
        push_commentary(cards, name, &text);
        return Some(name.to_string());
    }

    let value = if value.is_empty() || is_fits_literal(&value) {
        Value::Verbatim(value)
    } else {
        Value::String(value)
    };
    let comment = (!comment.is_empty()).then_some(comment.as_str());
    push_valued(cards, warnings, name, value, comment);
    Some(name.to_string())
}

fn property_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(s) => Value::String(ascii_text(s)),
        PropertyValue::TimePoint(t) => {
            Value::String(ascii_text(t.strip_suffix('Z').unwrap_or(t)))
        }
        PropertyValue::Boolean(b) => Value::Logical(*b),
        PropertyValue::Integer(n) => Value::Integer(*n),
        PropertyValue::Float(f) if f.is_finite() => Value::Float(*f),
        PropertyValue::Float(f) => Value::String(f.to_string()),
        PropertyValue::Other { text, .. } => Value::String(ascii_text(text.trim())),
    }
}

fn property_text(value: &PropertyValue) -> String {
    match property_value(value) {
        Value::String(s) | Value::Verbatim(s) => s,
        Value::Logical(b) => (if b { "T" } else { "F" }).to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
    }
}

/// Build every header card of the output HDU except `END`.
///
/// The image's own properties are considered before `container_properties`;
/// the first source of a valued card wins, source keywords included.
pub fn build_cards(
    desc: &ImageDescriptor,
    pixels: &PixelBuffer,
    container_properties: &[PropertyRecord],
    source_name: Option<&str>,
    unsigned_offset: bool,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Card>> {
    let axes = fits_axes(&desc.dimensions, desc.channel_count);
    if axes.iter().product::<usize>() != pixels.len() {
        return Err(Error::Internal(format!(
            "image {}: {} samples do not fill axes {:?}",
            desc.index,
            pixels.len(),
            axes
        )));
    }

    let offset_u16 = unsigned_offset && matches!(pixels, PixelBuffer::U16(_));
    if let PixelBuffer::U16(v) = pixels {
        let max = v.iter().copied().max().unwrap_or(0);
        if !offset_u16 && max > i16::MAX as u16 {
            warnings.push(Warning::UnsignedWrap { max });
        }
    }

    let mut cards = vec![
        Card::new("SIMPLE", Value::Logical(true), Some("conforms to FITS standard")),
        Card::new("BITPIX", Value::Integer(pixels.bitpix()), Some("bits per data value")),
        Card::new("NAXIS", Value::Integer(axes.len() as i64), Some("number of axes")),
    ];
    for (i, &n) in axes.iter().enumerate() {
        cards.push(Card::new(&format!("NAXIS{}", i + 1), Value::Integer(n as i64), None));
    }
    cards.push(Card::new("EXTEND", Value::Logical(true), None));
    cards.push(Card::new(
        "BZERO",
        Value::Integer(if offset_u16 { 32768 } else { 0 }),
        Some("physical = BZERO + BSCALE * stored"),
    ));
    cards.push(Card::new("BSCALE", Value::Integer(1), None));

    let w = warnings;
    push_valued(&mut cards, w, "ORIGIN", Value::String(ORIGIN.into()), None);
    if let Some(name) = source_name {
        push_valued(&mut cards, w, "XISFFILE", Value::String(ascii_text(name)), Some("source file"));
    }
    push_valued(
        &mut cards,
        w,
        "XISFFMT",
        Value::String(desc.sample_format.name().into()),
        Some("source sample format"),
    );
    push_valued(
        &mut cards,
        w,
        "XISFGEOM",
        Value::String(ascii_text(&desc.geometry)),
        Some("source geometry"),
    );
    let codec = desc
        .compression
        .as_ref()
        .map_or_else(|| "none".to_string(), |c| c.label());
    push_valued(&mut cards, w, "XISFCOMP", Value::String(codec), Some("source compression"));
    push_valued(
        &mut cards,
        w,
        "XISFCSPC",
        Value::String(desc.color_space.name().into()),
        Some("source color space"),
    );
    for (i, &n) in desc.geometry_entries().iter().enumerate() {
        let name = format!("XISFDIM{}", i + 1);
        if i < MAX_DIM_CARDS {
            cards.push(Card::new(&name, Value::Integer(n as i64), None));
        } else {
            w.push(Warning::KeywordSkipped {
                name,
                reason: "dimension recorded in XISFGEOM only",
            });
        }
    }

    let mut taken: HashSet<String> = HashSet::new();
    for record in &desc.keywords {
        if let Some(name) = keyword_card(record, &mut cards, w) {
            taken.insert(name);
        }
    }

    for property in desc.properties.iter().chain(container_properties) {
        let Some(&(_, card)) = PROPERTY_CARDS.iter().find(|(id, _)| *id == property.id) else {
            w.push(Warning::PropertyDropped {
                id: property.id.clone(),
            });
            continue;
        };
        if card == "COMMENT" {
            push_commentary(&mut cards, card, &property_text(&property.value));
            continue;
        }
        if !taken.insert(card.to_string()) {
            tracing::debug!(
                "image {}: {} already set, ignoring property {}",
                desc.index,
                card,
                property.id
            );
            continue;
        }
        push_valued(&mut cards, w, card, property_value(&property.value), None);
    }

    Ok(cards)
}

/// Serialize the header and pixel data into a complete FITS file.
pub fn write_fits(cards: &[Card], pixels: &PixelBuffer, unsigned_offset: bool) -> Vec<u8> {
    let mut out = serialize_header(cards);
    out.extend_from_slice(&pixels.to_be_bytes(unsigned_offset));
    pad_to_block(&mut out, Fill::Data);
    out
}
