/// All errors that can occur while converting an XISF container to FITS.
///
/// Image-level variants carry the index of the image they belong to so that
/// a batch caller can report one malformed image without abandoning the
/// rest of the container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong signature or version tag in the container prologue.
    #[error("not an XISF container: {0}")]
    Format(String),
    /// The buffer ends before a structure it declares.
    #[error("truncated input: {what} needs {needed} bytes but only {available} are present")]
    TruncatedInput {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    /// Unparseable or self-contradictory XML metadata.
    #[error("{}invalid `{field}`: {reason}", image_prefix(.image))]
    Metadata {
        image: Option<usize>,
        field: String,
        reason: String,
    },
    /// A strict conversion found no `<Image>` element.
    #[error("container holds no images")]
    NoImage,
    /// An attachment reference points outside the data region of the stream.
    #[error(
        "image {image}: attachment at offset {offset} with length {length} lies outside the data region [{data_start}, {stream_len})"
    )]
    DataBounds {
        image: usize,
        offset: usize,
        length: usize,
        data_start: usize,
        stream_len: usize,
    },
    /// Codec (or codec/shuffle combination) this crate does not decode.
    #[error("image {image}: unsupported codec `{codec}`")]
    UnsupportedCodec { image: usize, codec: String },
    /// A size check failed: decompressed size, attachment size, or element count.
    #[error("image {image}: {field} size mismatch: expected {expected} bytes, got {actual}")]
    Validation {
        image: usize,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The compressed stream itself could not be decoded.
    #[error("image {image}: corrupt {codec} stream: {reason}")]
    Decompression {
        image: usize,
        codec: &'static str,
        reason: String,
    },
    /// An invariant of this crate was violated; never caused by input.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error while reading a source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

fn image_prefix(image: &Option<usize>) -> String {
    match image {
        Some(i) => format!("image {i}: "),
        None => String::new(),
    }
}

impl Error {
    /// Shorthand for a metadata error on a specific attribute.
    pub fn metadata(image: Option<usize>, field: &str, reason: impl Into<String>) -> Self {
        Error::Metadata {
            image,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Index of the image this error is attributed to, if any.
    pub fn image(&self) -> Option<usize> {
        match self {
            Error::Metadata { image, .. } => *image,
            Error::DataBounds { image, .. }
            | Error::UnsupportedCodec { image, .. }
            | Error::Validation { image, .. }
            | Error::Decompression { image, .. } => Some(*image),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let e = Error::Format("bad signature".into());
        assert_eq!(e.to_string(), "not an XISF container: bad signature");
    }

    #[test]
    fn display_truncated() {
        let e = Error::TruncatedInput {
            what: "XML header",
            needed: 400,
            available: 100,
        };
        assert_eq!(
            e.to_string(),
            "truncated input: XML header needs 400 bytes but only 100 are present"
        );
    }

    #[test]
    fn display_metadata_with_and_without_image() {
        let e = Error::metadata(Some(2), "geometry", "empty entry");
        assert_eq!(e.to_string(), "image 2: invalid `geometry`: empty entry");

        let e = Error::metadata(None, "xisf", "missing root element");
        assert_eq!(e.to_string(), "invalid `xisf`: missing root element");
    }

    #[test]
    fn display_validation() {
        let e = Error::Validation {
            image: 0,
            field: "decompressed",
            expected: 32,
            actual: 30,
        };
        assert_eq!(
            e.to_string(),
            "image 0: decompressed size mismatch: expected 32 bytes, got 30"
        );
    }

    #[test]
    fn image_attribution() {
        assert_eq!(Error::NoImage.image(), None);
        assert_eq!(Error::metadata(Some(3), "x", "y").image(), Some(3));
        let e = Error::DataBounds {
            image: 1,
            offset: 10,
            length: 10,
            data_start: 0,
            stream_len: 15,
        };
        assert_eq!(e.image(), Some(1));
        let e = Error::UnsupportedCodec {
            image: 4,
            codec: "zstd".into(),
        };
        assert_eq!(e.image(), Some(4));
        assert!(e.to_string().contains("zstd"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::other("oops");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        let e = Error::NoImage;
        assert!(e.source().is_none());

        let e = Error::Io(std::io::Error::other("inner"));
        assert!(e.source().is_some());
    }
}
