//! The conversion pipeline: container, metadata, attachment, codec, pixels,
//! FITS output.

use core::fmt;
use std::path::Path;

use crate::attachment;
use crate::codec;
use crate::container::{read_container, Container};
use crate::emit::{build_cards, fits_axes, write_fits};
use crate::error::{Error, Result};
use crate::header::Card;
use crate::metadata::{parse_metadata, ImageDescriptor, Metadata, PropertyRecord};
use crate::pixel::{reconstruct, PixelBuffer, Statistics};

/// Options controlling a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// A container without images is an error for [`convert_all`].
    pub strict: bool,
    /// File name recorded in the `XISFFILE` card.
    pub source_name: Option<String>,
    /// Write `UInt16` data with `BZERO = 32768` instead of bit for bit.
    pub unsigned_offset: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            strict: true,
            source_name: None,
            unsigned_offset: false,
        }
    }
}

impl ConvertOptions {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_unsigned_offset(mut self, enabled: bool) -> Self {
        self.unsigned_offset = enabled;
        self
    }
}

/// A recoverable condition met during conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A property outside the header allow-list was not written.
    PropertyDropped { id: String },
    /// A card value did not fit its 70-byte field and was cut.
    ValueTruncated { keyword: String },
    /// A keyword was not written: an unusable source `FITSKeyword`, or an
    /// `XISFDIMn` card past `XISFDIM9`.
    KeywordSkipped { name: String, reason: &'static str },
    /// The image declares a checksum, which is not verified.
    ChecksumNotVerified { checksum: String },
    /// `UInt16` values above 32767 written without the unsigned offset read
    /// back as negative numbers.
    UnsignedWrap { max: u16 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PropertyDropped { id } => write!(f, "property `{id}` not mapped to a header card"),
            Warning::ValueTruncated { keyword } => write!(f, "value of {keyword} truncated to fit the card"),
            Warning::KeywordSkipped { name, reason } => write!(f, "keyword `{name}` skipped: {reason}"),
            Warning::ChecksumNotVerified { checksum } => write!(f, "checksum `{checksum}` not verified"),
            Warning::UnsignedWrap { max } => write!(
                f,
                "UInt16 maximum {max} exceeds 32767 and is stored without BZERO offset"
            ),
        }
    }
}

/// Everything produced by converting one image.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// Position of the image in the source container.
    pub image_index: usize,
    pub pixels: PixelBuffer,
    /// Spatial dimensions, width first.
    pub dimensions: Vec<usize>,
    pub channel_count: usize,
    pub statistics: Statistics,
    /// Header cards written, `END` excluded.
    pub cards: Vec<Card>,
    pub warnings: Vec<Warning>,
    /// The complete FITS file.
    pub fits: Vec<u8>,
}

impl ConversionResult {
    /// FITS axis lengths, `NAXIS1` first.
    pub fn axes(&self) -> Vec<usize> {
        fits_axes(&self.dimensions, self.channel_count)
    }

    /// The pixels shaped row-major, channel axis first.
    #[cfg(feature = "array")]
    pub fn to_array(&self) -> Result<ndarray::ArrayD<f64>> {
        self.pixels.to_array(&self.dimensions, self.channel_count)
    }
}

fn convert_descriptor(
    container: &Container<'_>,
    desc: ImageDescriptor,
    container_properties: &[PropertyRecord],
    opts: &ConvertOptions,
) -> Result<ConversionResult> {
    let index = desc.index;
    let raw = attachment::resolve(&desc.location, container.stream, container.data_start, index)?;
    let decoded = codec::decode(raw, desc.compression.as_ref(), desc.expected_size(), index)?;
    let (pixels, statistics) = reconstruct(&decoded, &desc)?;

    let mut warnings = Vec::new();
    if let Some(checksum) = &desc.checksum {
        warnings.push(Warning::ChecksumNotVerified {
            checksum: checksum.clone(),
        });
    }
    let cards = build_cards(
        &desc,
        &pixels,
        container_properties,
        opts.source_name.as_deref(),
        opts.unsigned_offset,
        &mut warnings,
    )?;
    let fits = write_fits(&cards, &pixels, opts.unsigned_offset);

    for warning in &warnings {
        tracing::warn!("image {}: {}", index, warning);
    }
    tracing::info!(
        "image {}: {} {:?} -> BITPIX {}, {} bytes of FITS",
        index,
        desc.sample_format,
        fits_axes(&desc.dimensions, desc.channel_count),
        pixels.bitpix(),
        fits.len()
    );

    Ok(ConversionResult {
        image_index: index,
        pixels,
        dimensions: desc.dimensions,
        channel_count: desc.channel_count,
        statistics,
        cards,
        warnings,
        fits,
    })
}

/// Convert the first image of an XISF container.
pub fn convert(bytes: &[u8], opts: &ConvertOptions) -> Result<ConversionResult> {
    convert_image(bytes, 0, opts)
}

/// Convert image `index` of an XISF container.
pub fn convert_image(bytes: &[u8], index: usize, opts: &ConvertOptions) -> Result<ConversionResult> {
    let container = read_container(bytes)?;
    let mut metadata = parse_metadata(container.metadata)?;
    let desc = metadata.take_image(index)?;
    convert_descriptor(&container, desc, &metadata.properties, opts)
}

/// Convert every image of an XISF container.
///
/// Container-level failures fail the call. Each image succeeds or fails on
/// its own. With `strict` unset, an empty container yields an empty list.
pub fn convert_all(bytes: &[u8], opts: &ConvertOptions) -> Result<Vec<Result<ConversionResult>>> {
    let container = read_container(bytes)?;
    let Metadata {
        images, properties, ..
    } = parse_metadata(container.metadata)?;
    if images.is_empty() && opts.strict {
        return Err(Error::NoImage);
    }
    Ok(images
        .into_iter()
        .map(|desc| desc.and_then(|d| convert_descriptor(&container, d, &properties, opts)))
        .collect())
}

/// Read and convert the first image of an XISF file.
///
/// `source_name` defaults to the file name of `path`.
pub fn convert_file(path: impl AsRef<Path>, opts: &ConvertOptions) -> Result<ConversionResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    tracing::debug!("read {} bytes from {}", bytes.len(), path.display());

    match (&opts.source_name, path.file_name()) {
        (None, Some(name)) => {
            let opts = opts.clone().with_source_name(name.to_string_lossy());
            convert(&bytes, &opts)
        }
        _ => convert(&bytes, opts),
    }
}

/// Parse the container and its XML header without decoding any pixels.
pub fn inspect(bytes: &[u8]) -> Result<Metadata> {
    let container = read_container(bytes)?;
    parse_metadata(container.metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = ConvertOptions::default();
        assert!(opts.strict);
        assert!(!opts.unsigned_offset);
        assert_eq!(opts.source_name, None);
    }

    #[test]
    fn builder_methods() {
        let opts = ConvertOptions::default()
            .with_strict(false)
            .with_source_name("a.xisf")
            .with_unsigned_offset(true);
        assert!(!opts.strict);
        assert!(opts.unsigned_offset);
        assert_eq!(opts.source_name.as_deref(), Some("a.xisf"));
    }

    #[test]
    fn warning_display() {
        let w = Warning::KeywordSkipped {
            name: "NAXIS1".into(),
            reason: "structural keyword is written by the converter",
        };
        assert_eq!(
            w.to_string(),
            "keyword `NAXIS1` skipped: structural keyword is written by the converter"
        );
        let w = Warning::ChecksumNotVerified {
            checksum: "sha1:00ff".into(),
        };
        assert!(w.to_string().contains("sha1:00ff"));
    }

    #[test]
    fn not_xisf_fails_before_metadata() {
        assert!(matches!(
            convert(b"SIMPLE  =                    T", &ConvertOptions::default()),
            Err(Error::Format(_))
        ));
        assert!(matches!(inspect(&[]), Err(Error::TruncatedInput { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            convert_file(dir.path().join("absent.xisf"), &ConvertOptions::default()),
            Err(Error::Io(_))
        ));
    }
}
