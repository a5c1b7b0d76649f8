//! In-memory XISF container builder and FITS read-back helpers shared by
//! the integration tests.

#![allow(dead_code)]

use xisf_fits::header::{find_integer, parse_header_blocks, Card};

// ---------------------------------------------------------------------------
// Container builder
// ---------------------------------------------------------------------------

/// Where a test image keeps its data block.
pub enum Payload {
    /// Bytes appended to the data region; the location is filled in.
    Attachment(Vec<u8>),
    /// `inline:<encoding>` with the given element text.
    Inline(&'static str, String),
    /// `embedded` with a `<Data encoding>` child.
    Embedded(&'static str, String),
    /// A literal `location` attribute and no data.
    Location(String),
}

pub struct TestImage {
    attrs: Vec<(String, String)>,
    children: String,
    payload: Payload,
}

impl TestImage {
    pub fn new(geometry: &str, sample_format: &str, payload: Payload) -> Self {
        TestImage {
            attrs: vec![
                ("geometry".into(), geometry.into()),
                ("sampleFormat".into(), sample_format.into()),
            ],
            children: String::new(),
            payload,
        }
    }

    /// An uncompressed attachment.
    pub fn raw(geometry: &str, sample_format: &str, data: Vec<u8>) -> Self {
        Self::new(geometry, sample_format, Payload::Attachment(data))
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, xml: &str) -> Self {
        self.children.push_str(xml);
        self
    }

    fn xml(&self, location: &str) -> String {
        let mut out = String::from("<Image");
        for (k, v) in &self.attrs {
            out.push_str(&format!(" {k}=\"{v}\""));
        }
        out.push_str(&format!(" location=\"{location}\">"));
        out.push_str(&self.children);
        match &self.payload {
            Payload::Inline(_, text) => out.push_str(text),
            Payload::Embedded(encoding, text) => {
                out.push_str(&format!("<Data encoding=\"{encoding}\">{text}</Data>"))
            }
            _ => {}
        }
        out.push_str("</Image>");
        out
    }
}

/// Build a monolithic XISF file. `container_xml` is placed inside the root
/// element after the images; `gap` padding bytes separate the XML header
/// from the first attachment.
pub fn xisf_with_gap(images: &[TestImage], container_xml: &str, gap: usize) -> Vec<u8> {
    // Offsets are zero-padded to a fixed width so the XML length does not
    // depend on them.
    let render = |offsets: &[usize]| -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <xisf version=\"1.0\" xmlns=\"http://www.pixinsight.com/xisf\">",
        );
        let mut next = offsets.iter();
        for image in images {
            let location = match &image.payload {
                Payload::Attachment(data) => format!(
                    "attachment:{:012}:{}",
                    next.next().copied().unwrap_or(0),
                    data.len()
                ),
                Payload::Inline(encoding, _) => format!("inline:{encoding}"),
                Payload::Embedded(..) => "embedded".into(),
                Payload::Location(text) => text.clone(),
            };
            xml.push_str(&image.xml(&location));
        }
        xml.push_str(container_xml);
        xml.push_str("</xisf>");
        xml
    };

    let attachments: Vec<&Vec<u8>> = images
        .iter()
        .filter_map(|i| match &i.payload {
            Payload::Attachment(data) => Some(data),
            _ => None,
        })
        .collect();

    let probe = render(&vec![0; attachments.len()]);
    let data_start = 16 + probe.len() + gap;
    let mut offsets = Vec::new();
    let mut at = data_start;
    for data in &attachments {
        offsets.push(at);
        at += data.len();
    }
    let xml = render(&offsets);
    assert_eq!(xml.len(), probe.len());

    let mut out = b"XISF0100".to_vec();
    out.extend_from_slice(&(xml.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(xml.as_bytes());
    out.extend(std::iter::repeat(0u8).take(gap));
    for data in attachments {
        out.extend_from_slice(data);
    }
    out
}

pub fn xisf(images: &[TestImage]) -> Vec<u8> {
    xisf_with_gap(images, "", 0)
}

// ---------------------------------------------------------------------------
// Sample encoding and compression
// ---------------------------------------------------------------------------

pub fn le_u16(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(data, 6)
}

pub fn lz4(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];
    out.extend(miniz_oxide::deflate::compress_to_vec(data, 6));
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

/// Compress `data` as XISF would for `codec` (`zlib`, `lz4`, `lz4hc`,
/// `gzip`), returning the block and its `compression` attribute.
pub fn compress(data: &[u8], codec: &str, shuffle_width: Option<usize>) -> (Vec<u8>, String) {
    let input = match shuffle_width {
        Some(w) => xisf_fits::codec::shuffle(data, w),
        None => data.to_vec(),
    };
    let block = match codec {
        "zlib" => zlib(&input),
        "lz4" | "lz4hc" => lz4(&input),
        "gzip" => gzip(&input),
        other => panic!("no test compressor for {other}"),
    };
    let attr = match shuffle_width {
        Some(w) => format!("{codec}+sh:{}:{w}", data.len()),
        None => format!("{codec}:{}", data.len()),
    };
    (block, attr)
}

// ---------------------------------------------------------------------------
// FITS read-back
// ---------------------------------------------------------------------------

/// Parse the header of a FITS file and decode its primary array to `f64`,
/// applying BZERO.
pub fn read_fits(fits: &[u8]) -> (Vec<Card>, Vec<f64>) {
    assert_eq!(fits.len() % xisf_fits::BLOCK_SIZE, 0, "FITS length not block aligned");
    let (cards, header_len) = parse_header_blocks(fits).expect("no END card");
    let bitpix = find_integer(&cards, "BITPIX").expect("BITPIX");
    let naxis = find_integer(&cards, "NAXIS").expect("NAXIS");
    let count: usize = (1..=naxis)
        .map(|i| find_integer(&cards, &format!("NAXIS{i}")).expect("NAXISn") as usize)
        .product();
    let bzero = find_integer(&cards, "BZERO").unwrap_or(0) as f64;

    let width = (bitpix.unsigned_abs() / 8) as usize;
    let data = &fits[header_len..header_len + count * width];
    let values = data
        .chunks_exact(width)
        .map(|c| {
            let stored = match bitpix {
                8 => f64::from(c[0]),
                16 => f64::from(i16::from_be_bytes([c[0], c[1]])),
                32 => f64::from(i32::from_be_bytes([c[0], c[1], c[2], c[3]])),
                -32 => f64::from(f32::from_be_bytes([c[0], c[1], c[2], c[3]])),
                -64 => f64::from_be_bytes(c.try_into().unwrap()),
                other => panic!("unexpected BITPIX {other}"),
            };
            stored + bzero
        })
        .collect();
    (cards, values)
}
