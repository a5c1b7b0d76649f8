//! XISF XML header parsing into typed image descriptors.
//!
//! The XML is walked once. Every attribute an image needs later in the
//! pipeline is validated here, so later stages never see a missing or
//! malformed field. An image whose attributes are invalid yields an error
//! for that image only; its siblings are still described.

use core::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};

// ── Attribute vocabularies ──

/// Pixel sample encoding declared by `sampleFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int16,
    Int32,
    Float32,
    Float64,
    /// Pair of `f32` (real, imaginary).
    Complex32,
    /// Pair of `f64` (real, imaginary).
    Complex64,
}

impl SampleFormat {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "UInt8" => SampleFormat::UInt8,
            "UInt16" => SampleFormat::UInt16,
            "UInt32" => SampleFormat::UInt32,
            "UInt64" => SampleFormat::UInt64,
            "Int16" => SampleFormat::Int16,
            "Int32" => SampleFormat::Int32,
            "Float32" => SampleFormat::Float32,
            "Float64" => SampleFormat::Float64,
            "Complex32" => SampleFormat::Complex32,
            "Complex64" => SampleFormat::Complex64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::UInt8 => "UInt8",
            SampleFormat::UInt16 => "UInt16",
            SampleFormat::UInt32 => "UInt32",
            SampleFormat::UInt64 => "UInt64",
            SampleFormat::Int16 => "Int16",
            SampleFormat::Int32 => "Int32",
            SampleFormat::Float32 => "Float32",
            SampleFormat::Float64 => "Float64",
            SampleFormat::Complex32 => "Complex32",
            SampleFormat::Complex64 => "Complex64",
        }
    }

    /// Bytes per sample. Complex samples count both components.
    pub fn byte_width(self) -> usize {
        match self {
            SampleFormat::UInt8 => 1,
            SampleFormat::UInt16 | SampleFormat::Int16 => 2,
            SampleFormat::UInt32 | SampleFormat::Int32 | SampleFormat::Float32 => 4,
            SampleFormat::UInt64 | SampleFormat::Float64 | SampleFormat::Complex32 => 8,
            SampleFormat::Complex64 => 16,
        }
    }

    /// Width of the scalar unit a byte swap operates on.
    pub fn scalar_width(self) -> usize {
        match self {
            SampleFormat::Complex32 => 4,
            SampleFormat::Complex64 => 8,
            other => other.byte_width(),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color space declared by `colorSpace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    CieLab,
}

impl ColorSpace {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Gray" => Some(ColorSpace::Gray),
            "RGB" => Some(ColorSpace::Rgb),
            "CIELab" => Some(ColorSpace::CieLab),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Gray => "Gray",
            ColorSpace::Rgb => "RGB",
            ColorSpace::CieLab => "CIELab",
        }
    }

    /// Nominal channel count; extra channels beyond it are alpha channels.
    pub fn nominal_channels(self) -> usize {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb | ColorSpace::CieLab => 3,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel layout declared by `pixelStorage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelStorage {
    /// All samples of channel 0, then channel 1, and so on.
    Planar,
    /// Channels interleaved per pixel.
    Normal,
}

/// Sample byte order declared by `byteOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Compression codecs an XISF data block may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Zlib,
    Lz4,
    Lz4Hc,
    Gzip,
    Zstd,
}

impl Codec {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "zlib" => Some(Codec::Zlib),
            "lz4" => Some(Codec::Lz4),
            "lz4hc" => Some(Codec::Lz4Hc),
            "gzip" => Some(Codec::Gzip),
            "zstd" => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::Zlib => "zlib",
            Codec::Lz4 => "lz4",
            Codec::Lz4Hc => "lz4hc",
            Codec::Gzip => "gzip",
            Codec::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed `compression` attribute: `codec[+sh]:uncompressed-size[:item-size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    pub codec: Codec,
    pub uncompressed_size: usize,
    /// Byte-shuffle item size, when the block was shuffled before compression.
    pub shuffle: Option<usize>,
}

impl Compression {
    pub fn parse(text: &str, image: usize) -> Result<Self> {
        let bad = |reason: &str| Error::metadata(Some(image), "compression", reason);
        let mut parts = text.split(':').map(str::trim);

        let head = parts.next().unwrap_or_default();
        let (name, shuffled) = match head.strip_suffix("+sh") {
            Some(name) => (name, true),
            None => (head, false),
        };
        if name.is_empty() {
            return Err(bad("missing codec name"));
        }
        let codec = Codec::from_name(name).ok_or_else(|| Error::UnsupportedCodec {
            image,
            codec: head.to_string(),
        })?;

        let uncompressed_size = parts
            .next()
            .ok_or_else(|| bad("missing uncompressed size"))?
            .parse::<usize>()
            .map_err(|_| bad("uncompressed size is not an unsigned integer"))?;

        let item_size = parts
            .next()
            .map(|s| match s.parse::<usize>() {
                Ok(0) | Err(_) => Err(bad("shuffle item size must be a positive integer")),
                Ok(n) => Ok(n),
            })
            .transpose()?;

        if parts.next().is_some() {
            return Err(bad("too many fields"));
        }

        let shuffle = match (shuffled, item_size) {
            (true, None) => return Err(bad("`+sh` requires an item size")),
            (_, item_size) => item_size,
        };

        Ok(Compression {
            codec,
            uncompressed_size,
            shuffle,
        })
    }

    /// Codec label as written in the attribute, e.g. `zlib+sh`.
    pub fn label(&self) -> String {
        match self.shuffle {
            Some(_) => format!("{}+sh", self.codec),
            None => self.codec.to_string(),
        }
    }
}

/// Text encoding of inline or embedded data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineEncoding {
    Base64,
    Hex,
}

impl InlineEncoding {
    fn parse(name: &str, image: usize) -> Result<Self> {
        match name.trim() {
            "base64" => Ok(InlineEncoding::Base64),
            "hex" => Ok(InlineEncoding::Hex),
            other => Err(Error::metadata(
                Some(image),
                "location",
                format!("unknown inline encoding `{other}`"),
            )),
        }
    }
}

/// Where the pixel data block of an image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLocation {
    /// Byte range of the whole stream (absolute offset).
    Attachment { offset: usize, length: usize },
    /// Encoded text content of the `<Image>` element itself.
    Inline { encoding: InlineEncoding, text: String },
    /// Encoded text of a child `<Data>` element.
    Embedded { encoding: InlineEncoding, text: String },
}

impl DataLocation {
    fn parse(text: &str, image: usize, inline: &str, embedded: Option<&RawData>) -> Result<Self> {
        let bad = |reason: String| Error::metadata(Some(image), "location", reason);
        let mut parts = text.split(':').map(str::trim);
        let kind = parts.next().unwrap_or_default();

        match kind {
            "attachment" => {
                let mut number = |what: &str| -> Result<usize> {
                    parts
                        .next()
                        .ok_or_else(|| bad(format!("attachment is missing its {what}")))?
                        .parse::<u64>()
                        .ok()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| bad(format!("attachment {what} is not an unsigned integer")))
                };
                let offset = number("offset")?;
                let length = number("size")?;
                Ok(DataLocation::Attachment { offset, length })
            }
            "inline" => {
                let encoding = InlineEncoding::parse(parts.next().unwrap_or_default(), image)?;
                Ok(DataLocation::Inline {
                    encoding,
                    text: inline.to_string(),
                })
            }
            "embedded" => {
                let data = embedded
                    .ok_or_else(|| bad("embedded location without a <Data> element".into()))?;
                let encoding = InlineEncoding::parse(&data.encoding, image)?;
                Ok(DataLocation::Embedded {
                    encoding,
                    text: data.text.clone(),
                })
            }
            k if k.starts_with("url(") || k.starts_with("path(") => {
                Err(bad("external data blocks are not supported".into()))
            }
            other => Err(bad(format!("unknown location kind `{other}`"))),
        }
    }
}

// ── Records ──

/// A legacy FITS keyword stored in the XISF header. Order and duplicates
/// are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRecord {
    pub name: String,
    /// Value text in FITS literal syntax, e.g. `'M31'` or `120.0`.
    pub value: String,
    pub comment: String,
}

/// Typed value of an XISF property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    TimePoint(String),
    /// Vector, matrix, or unrecognized types, kept as text.
    Other { type_name: String, text: String },
}

impl PropertyValue {
    /// Type a raw property value. Never fails: unparseable numbers are kept
    /// as [`PropertyValue::Other`].
    pub fn from_typed(type_name: &str, raw: &str) -> Self {
        let other = || PropertyValue::Other {
            type_name: type_name.to_string(),
            text: raw.to_string(),
        };
        let trimmed = raw.trim();
        match type_name {
            "String" => PropertyValue::String(raw.to_string()),
            "TimePoint" => PropertyValue::TimePoint(trimmed.to_string()),
            "Boolean" => match trimmed {
                "true" | "1" => PropertyValue::Boolean(true),
                "false" | "0" => PropertyValue::Boolean(false),
                _ => other(),
            },
            "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" | "UInt64" => {
                trimmed
                    .parse::<i64>()
                    .map(PropertyValue::Integer)
                    .unwrap_or_else(|_| other())
            }
            "Float32" | "Float64" => trimmed
                .parse::<f64>()
                .map(PropertyValue::Float)
                .unwrap_or_else(|_| other()),
            _ => other(),
        }
    }
}

/// A named XISF property at container or image scope.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub id: String,
    pub value: PropertyValue,
    pub comment: Option<String>,
}

// ── Image descriptor ──

/// Everything the pipeline needs to know about one image, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    /// Position of the `<Image>` element among its siblings.
    pub index: usize,
    pub id: Option<String>,
    /// The `geometry` attribute as written.
    pub geometry: String,
    /// Spatial dimensions, fastest-varying first (width, height, ...).
    pub dimensions: Vec<usize>,
    pub channel_count: usize,
    pub sample_format: SampleFormat,
    pub color_space: ColorSpace,
    pub pixel_storage: PixelStorage,
    pub byte_order: ByteOrder,
    pub compression: Option<Compression>,
    pub location: DataLocation,
    /// Declared checksum, not verified.
    pub checksum: Option<String>,
    pub keywords: Vec<KeywordRecord>,
    pub properties: Vec<PropertyRecord>,
}

impl ImageDescriptor {
    /// Samples per channel.
    pub fn pixels_per_channel(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Total samples across all channels.
    pub fn element_count(&self) -> usize {
        self.pixels_per_channel() * self.channel_count
    }

    /// Byte size of the decoded pixel block.
    pub fn expected_size(&self) -> usize {
        self.element_count() * self.sample_format.byte_width()
    }

    /// Every geometry entry, channel count last.
    pub fn geometry_entries(&self) -> Vec<usize> {
        let mut entries = self.dimensions.clone();
        entries.push(self.channel_count);
        entries
    }
}

/// Parse a geometry string (`:` or `,` separated) into spatial dimensions
/// and channel count.
///
/// Three or more entries end with the channel count; one or two entries are
/// all spatial with a single channel.
pub fn parse_geometry(text: &str, image: usize) -> Result<(Vec<usize>, usize)> {
    let bad = |reason: &str| Error::metadata(Some(image), "geometry", reason);
    let separator = if text.contains(':') { ':' } else { ',' };

    let mut entries = Vec::new();
    for part in text.split(separator) {
        let n = part
            .trim()
            .parse::<usize>()
            .map_err(|_| bad("entries must be unsigned integers"))?;
        if n == 0 {
            return Err(bad("entries must be positive"));
        }
        entries.push(n);
    }

    if entries.len() >= 3 {
        let channels = entries.pop().unwrap_or(1);
        Ok((entries, channels))
    } else {
        Ok((entries, 1))
    }
}

// ── Raw XML capture ──

#[derive(Debug, Default)]
struct RawData {
    encoding: String,
    text: String,
}

#[derive(Debug, Default)]
struct RawImage {
    index: usize,
    attrs: Vec<(String, String)>,
    keywords: Vec<KeywordRecord>,
    properties: Vec<PropertyRecord>,
    inline_text: String,
    embedded: Option<RawData>,
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

impl RawImage {
    fn required(&self, name: &str) -> Result<&str> {
        attr(&self.attrs, name)
            .ok_or_else(|| Error::metadata(Some(self.index), name, "required attribute is missing"))
    }

    fn into_descriptor(self) -> Result<ImageDescriptor> {
        let index = self.index;
        let bad = |field: &str, reason: String| Error::metadata(Some(index), field, reason);

        let geometry = self.required("geometry")?.to_string();
        let (dimensions, channel_count) = parse_geometry(&geometry, index)?;

        let format_name = self.required("sampleFormat")?;
        let sample_format = SampleFormat::parse(format_name)
            .ok_or_else(|| bad("sampleFormat", format!("unknown sample format `{format_name}`")))?;

        let color_space = match attr(&self.attrs, "colorSpace") {
            None => ColorSpace::Gray,
            Some(name) => ColorSpace::parse(name)
                .ok_or_else(|| bad("colorSpace", format!("unknown color space `{name}`")))?,
        };
        if channel_count < color_space.nominal_channels() {
            return Err(bad(
                "colorSpace",
                format!("{color_space} needs at least {} channels, geometry declares {channel_count}",
                    color_space.nominal_channels()),
            ));
        }

        let pixel_storage = match attr(&self.attrs, "pixelStorage") {
            None | Some("Planar") => PixelStorage::Planar,
            Some("Normal") => PixelStorage::Normal,
            Some(other) => return Err(bad("pixelStorage", format!("unknown storage `{other}`"))),
        };

        let byte_order = match attr(&self.attrs, "byteOrder") {
            None | Some("little") => ByteOrder::Little,
            Some("big") => ByteOrder::Big,
            Some(other) => return Err(bad("byteOrder", format!("unknown byte order `{other}`"))),
        };

        let compression = attr(&self.attrs, "compression")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|text| Compression::parse(text, index))
            .transpose()?;

        let location = DataLocation::parse(
            self.required("location")?,
            index,
            &self.inline_text,
            self.embedded.as_ref(),
        )?;

        let expected = dimensions
            .iter()
            .try_fold(channel_count, |acc, &d| acc.checked_mul(d))
            .and_then(|n| n.checked_mul(sample_format.byte_width()))
            .ok_or_else(|| bad("geometry", "image size overflows usize".into()))?;

        if let Some(c) = &compression {
            if c.uncompressed_size != expected {
                return Err(Error::Validation {
                    image: index,
                    field: "declared uncompressed",
                    expected,
                    actual: c.uncompressed_size,
                });
            }
        }

        Ok(ImageDescriptor {
            index,
            id: attr(&self.attrs, "id").map(String::from),
            geometry,
            dimensions,
            channel_count,
            sample_format,
            color_space,
            pixel_storage,
            byte_order,
            compression,
            location,
            checksum: attr(&self.attrs, "checksum").map(String::from),
            keywords: self.keywords,
            properties: self.properties,
        })
    }
}

/// An element whose text content is being collected.
enum Pending {
    Property {
        attrs: Vec<(String, String)>,
        in_image: bool,
        text: String,
    },
    Data(RawData),
}

// ── Parsed header ──

/// The parsed XML header of a container.
#[derive(Debug)]
pub struct Metadata {
    /// `version` attribute of the root element.
    pub version: Option<String>,
    /// One entry per `<Image>`, in document order.
    pub images: Vec<Result<ImageDescriptor>>,
    /// Container-scope properties.
    pub properties: Vec<PropertyRecord>,
}

impl Metadata {
    /// Remove and return the descriptor of image `index`.
    pub fn take_image(&mut self, index: usize) -> Result<ImageDescriptor> {
        let count = self.images.len();
        match self.images.get_mut(index) {
            None if count == 0 => Err(Error::NoImage),
            None => Err(Error::metadata(
                None,
                "Image",
                format!("image {index} requested but the container holds {count}"),
            )),
            Some(slot) => core::mem::replace(slot, Err(Error::Internal(format!(
                "image {index} taken twice"
            )))),
        }
    }
}

fn xml_error<R>(reader: &Reader<R>, err: impl fmt::Display) -> Error {
    Error::metadata(
        None,
        "xml",
        format!("at byte {}: {err}", reader.buffer_position()),
    )
}

fn attributes<R>(e: &BytesStart<'_>, reader: &Reader<R>) -> Result<Vec<(String, String)>> {
    e.attributes()
        .map(|a| {
            let a = a.map_err(|err| xml_error(reader, err))?;
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map_err(|err| xml_error(reader, err))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn finish_property(
    attrs: &[(String, String)],
    text: &str,
    index: Option<usize>,
) -> Option<PropertyRecord> {
    let Some(id) = attr(attrs, "id") else {
        tracing::warn!("skipping XISF property without an id (image {:?})", index);
        return None;
    };
    let type_name = attr(attrs, "type").unwrap_or("String");
    let raw = attr(attrs, "value").unwrap_or(text);
    Some(PropertyRecord {
        id: id.to_string(),
        value: PropertyValue::from_typed(type_name, raw),
        comment: attr(attrs, "comment").map(String::from),
    })
}

/// Parse the XML header of a container.
pub fn parse_metadata(xml: &[u8]) -> Result<Metadata> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut version = None;
    let mut saw_root = false;
    let mut raw_images: Vec<RawImage> = Vec::new();
    let mut current: Option<RawImage> = None;
    let mut properties = Vec::new();
    let mut pending: Option<Pending> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| xml_error(&reader, err))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.local_name().as_ref().to_vec();
                let parent = path.last().map(Vec::as_slice);

                match (parent, name.as_slice()) {
                    (None, b"xisf") => {
                        saw_root = true;
                        version = attr(&attributes(e, &reader)?, "version").map(String::from);
                    }
                    (None, other) => {
                        return Err(Error::metadata(
                            None,
                            "xisf",
                            format!(
                                "root element is <{}>",
                                String::from_utf8_lossy(other)
                            ),
                        ));
                    }
                    (Some(b"xisf"), b"Image") => {
                        let image = RawImage {
                            index: raw_images.len(),
                            attrs: attributes(e, &reader)?,
                            ..RawImage::default()
                        };
                        if is_empty {
                            raw_images.push(image);
                        } else {
                            current = Some(image);
                        }
                    }
                    (Some(b"Image"), b"FITSKeyword") if current.is_some() => {
                        let attrs = attributes(e, &reader)?;
                        let field = |k: &str| attr(&attrs, k).unwrap_or_default().to_string();
                        if let Some(image) = current.as_mut() {
                            image.keywords.push(KeywordRecord {
                                name: field("name"),
                                value: field("value"),
                                comment: field("comment"),
                            });
                        }
                    }
                    (Some(b"Image"), b"Data") if current.is_some() => {
                        let attrs = attributes(e, &reader)?;
                        let data = RawData {
                            encoding: attr(&attrs, "encoding").unwrap_or("base64").to_string(),
                            text: String::new(),
                        };
                        if is_empty {
                            if let Some(image) = current.as_mut() {
                                image.embedded = Some(data);
                            }
                        } else {
                            pending = Some(Pending::Data(data));
                        }
                    }
                    (Some(b"Image"), b"Property") | (Some(b"xisf" | b"Metadata"), b"Property") => {
                        let in_image = parent == Some(b"Image".as_slice());
                        let attrs = attributes(e, &reader)?;
                        if is_empty {
                            let scope = current.as_ref().filter(|_| in_image).map(|i| i.index);
                            if let Some(p) = finish_property(&attrs, "", scope) {
                                match current.as_mut().filter(|_| in_image) {
                                    Some(image) => image.properties.push(p),
                                    None => properties.push(p),
                                }
                            }
                        } else {
                            pending = Some(Pending::Property {
                                attrs,
                                in_image,
                                text: String::new(),
                            });
                        }
                    }
                    _ => {}
                }

                if !is_empty {
                    path.push(name);
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().map_err(|err| xml_error(&reader, err))?;
                append_text(&mut pending, &mut current, &path, &text);
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(c);
                append_text(&mut pending, &mut current, &path, &text);
            }
            Event::End(_) => {
                let closed = path.pop().unwrap_or_default();
                match (closed.as_slice(), pending.take()) {
                    (b"Property", Some(Pending::Property { attrs, in_image, text })) => {
                        let scope = current.as_ref().filter(|_| in_image).map(|i| i.index);
                        if let Some(p) = finish_property(&attrs, &text, scope) {
                            match current.as_mut().filter(|_| in_image) {
                                Some(image) => image.properties.push(p),
                                None => properties.push(p),
                            }
                        }
                    }
                    (b"Data", Some(Pending::Data(data))) => {
                        if let Some(image) = current.as_mut() {
                            image.embedded = Some(data);
                        }
                    }
                    (b"Image", still_pending) => {
                        pending = still_pending;
                        if path.last().map(Vec::as_slice) == Some(b"xisf".as_slice()) {
                            if let Some(image) = current.take() {
                                raw_images.push(image);
                            }
                        }
                    }
                    (_, still_pending) => pending = still_pending,
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(Error::metadata(None, "xisf", "no <xisf> root element"));
    }
    if let Some(open) = path.last() {
        return Err(Error::metadata(
            None,
            "xml",
            format!("unclosed element <{}>", String::from_utf8_lossy(open)),
        ));
    }

    let images: Vec<Result<ImageDescriptor>> = raw_images
        .into_iter()
        .map(RawImage::into_descriptor)
        .collect();

    tracing::debug!(
        "XISF header: {} image(s), {} container properties",
        images.len(),
        properties.len()
    );

    Ok(Metadata {
        version,
        images,
        properties,
    })
}

fn append_text(
    pending: &mut Option<Pending>,
    current: &mut Option<RawImage>,
    path: &[Vec<u8>],
    text: &str,
) {
    match pending {
        Some(Pending::Property { text: buf, .. }) => buf.push_str(text),
        Some(Pending::Data(data)) => data.text.push_str(text),
        None => {
            if path.last().map(Vec::as_slice) == Some(b"Image".as_slice()) {
                if let Some(image) = current.as_mut() {
                    image.inline_text.push_str(text);
                }
            }
        }
    }
}
