//! Shared plumbing for the `xisf2fits` and `xisfinfo` binaries.

use std::path::{Path, PathBuf};

use xisf_fits::metadata::{DataLocation, ImageDescriptor, InlineEncoding};
use xisf_fits::{convert_all, convert_image, ConvertOptions, Error, Metadata, Result};

/// Which images of a container to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Image(usize),
    All,
}

/// Outcome of converting one input file.
#[derive(Debug, Default)]
pub struct FileReport {
    /// FITS files written, in image order.
    pub written: Vec<PathBuf>,
    /// Images that could not be converted under [`Selection::All`].
    pub failures: Vec<(usize, Error)>,
}

/// Install a `fmt` subscriber on stderr. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second install (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// `<stem>.fits`, or `<stem>_<n>.fits` when `index` is given, placed in
/// `out_dir` or next to `input`.
pub fn output_path(input: &Path, out_dir: Option<&Path>, index: Option<usize>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let name = match index {
        Some(n) => format!("{stem}_{n}.fits"),
        None => format!("{stem}.fits"),
    };
    let dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(name)
}

/// Convert `input` and write the FITS output.
///
/// Container-level failures and, for a single image, conversion failures
/// are returned as `Err`. Under [`Selection::All`] each image that fails is
/// collected in the report while the others are still written.
pub fn convert_path(
    input: &Path,
    out_dir: Option<&Path>,
    selection: Selection,
    opts: &ConvertOptions,
) -> Result<FileReport> {
    let bytes = std::fs::read(input)?;
    let mut opts = opts.clone();
    if opts.source_name.is_none() {
        if let Some(name) = input.file_name() {
            opts.source_name = Some(name.to_string_lossy().into_owned());
        }
    }

    let mut report = FileReport::default();
    match selection {
        Selection::Image(index) => {
            let result = convert_image(&bytes, index, &opts)?;
            let path = output_path(input, out_dir, None);
            std::fs::write(&path, &result.fits)?;
            tracing::info!("{} -> {}", input.display(), path.display());
            report.written.push(path);
        }
        Selection::All => {
            for (index, result) in convert_all(&bytes, &opts)?.into_iter().enumerate() {
                match result {
                    Ok(result) => {
                        let path = output_path(input, out_dir, Some(index));
                        std::fs::write(&path, &result.fits)?;
                        tracing::info!("{} [{}] -> {}", input.display(), index, path.display());
                        report.written.push(path);
                    }
                    Err(e) => report.failures.push((index, e)),
                }
            }
        }
    }
    Ok(report)
}

fn location_label(location: &DataLocation) -> String {
    let encoding = |e: &InlineEncoding| match e {
        InlineEncoding::Base64 => "base64",
        InlineEncoding::Hex => "hex",
    };
    match location {
        DataLocation::Attachment { offset, length } => {
            format!("attachment at {} ({} bytes)", offset, length)
        }
        DataLocation::Inline { encoding: e, text } => {
            format!("inline {} ({} chars)", encoding(e), text.len())
        }
        DataLocation::Embedded { encoding: e, text } => {
            format!("embedded {} ({} chars)", encoding(e), text.len())
        }
    }
}

/// Human-readable summary of one image descriptor.
pub fn format_image(desc: &ImageDescriptor) -> String {
    let mut out = String::new();
    match &desc.id {
        Some(id) => out.push_str(&format!("Image {}: {}\n", desc.index, id)),
        None => out.push_str(&format!("Image {}\n", desc.index)),
    }
    out.push_str(&format!("  Geometry: {}\n", desc.geometry));
    out.push_str(&format!("  Dimensions: {:?}\n", desc.dimensions));
    out.push_str(&format!("  Channels: {}\n", desc.channel_count));
    out.push_str(&format!("  Sample format: {}\n", desc.sample_format));
    out.push_str(&format!("  Color space: {}\n", desc.color_space));
    out.push_str(&format!("  Pixel storage: {:?}\n", desc.pixel_storage));
    out.push_str(&format!("  Byte order: {:?}\n", desc.byte_order));
    match &desc.compression {
        Some(c) => out.push_str(&format!(
            "  Compression: {} ({} bytes uncompressed)\n",
            c.label(),
            c.uncompressed_size
        )),
        None => out.push_str("  Compression: none\n"),
    }
    out.push_str(&format!("  Location: {}\n", location_label(&desc.location)));
    out.push_str(&format!("  Data size: {} bytes\n", desc.expected_size()));
    if let Some(checksum) = &desc.checksum {
        out.push_str(&format!("  Checksum: {}\n", checksum));
    }
    out.push_str(&format!("  FITS keywords: {}\n", desc.keywords.len()));
    out.push_str(&format!("  Properties: {}\n", desc.properties.len()));
    out
}

/// Summary of a whole container, one block per image.
pub fn format_metadata(metadata: &Metadata) -> String {
    let mut out = String::new();
    if let Some(version) = &metadata.version {
        out.push_str(&format!("XISF version {}\n", version));
    }
    out.push_str(&format!("Images: {}\n", metadata.images.len()));
    out.push_str(&format!("Container properties: {}\n", metadata.properties.len()));
    for (index, image) in metadata.images.iter().enumerate() {
        match image {
            Ok(desc) => out.push_str(&format_image(desc)),
            Err(e) => out.push_str(&format!("Image {}: error: {}\n", index, e)),
        }
    }
    out
}
