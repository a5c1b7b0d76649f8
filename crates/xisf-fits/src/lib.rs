//! Pure Rust conversion of XISF images to FITS.
//!
//! ```no_run
//! use xisf_fits::{convert_file, ConvertOptions};
//!
//! let result = convert_file("m31.xisf", &ConvertOptions::default())?;
//! std::fs::write("m31.fits", &result.fits)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attachment;
pub mod block;
pub mod codec;
pub mod container;
pub mod convert;
pub mod emit;
pub mod endian;
pub mod error;
pub mod header;
pub mod metadata;
pub mod pixel;
pub mod value;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use convert::{
    convert, convert_all, convert_file, convert_image, inspect, ConversionResult, ConvertOptions,
    Warning,
};
pub use error::{Error, Result};
pub use metadata::{ImageDescriptor, Metadata};
pub use pixel::{PixelBuffer, Statistics};
