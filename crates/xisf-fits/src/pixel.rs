//! Typed pixel reconstruction from decoded XISF data blocks.
//!
//! XISF sample formats are mapped onto the numeric types a FITS primary
//! array can carry:
//!
//! | XISF        | output | BITPIX |
//! |-------------|--------|--------|
//! | UInt8       | `u8`   | 8      |
//! | UInt16      | `u16`  | 16     |
//! | Int16       | `i16`  | 16     |
//! | UInt32      | `i32` when every value fits, else `f32` | 32 / -32 |
//! | Int32       | `i32`  | 32     |
//! | UInt64      | `f64` (exact up to 2^53) | -64 |
//! | Float32     | `f32`  | -32    |
//! | Float64     | `f64`  | -64    |
//! | Complex32   | `f32` magnitude | -32 |
//! | Complex64   | `f64` magnitude | -64 |
//!
//! Statistics are gathered in the same pass as the type conversion.

use bytemuck::pod_collect_to_vec;

use crate::endian::{be_to_native, le_to_native, native_to_be};
use crate::error::{Error, Result};
use crate::metadata::{ByteOrder, ImageDescriptor, PixelStorage, SampleFormat};

/// Reconstructed pixel values in planar order, channel 0 first.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl PixelBuffer {
    /// FITS BITPIX code of the stored type.
    pub fn bitpix(&self) -> i64 {
        match self {
            PixelBuffer::U8(_) => 8,
            PixelBuffer::U16(_) | PixelBuffer::I16(_) => 16,
            PixelBuffer::I32(_) => 32,
            PixelBuffer::F32(_) => -32,
            PixelBuffer::F64(_) => -64,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PixelBuffer::U8(_) => "u8",
            PixelBuffer::U16(_) => "u16",
            PixelBuffer::I16(_) => "i16",
            PixelBuffer::I32(_) => "i32",
            PixelBuffer::F32(_) => "f32",
            PixelBuffer::F64(_) => "f64",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
            PixelBuffer::I16(v) => v.len(),
            PixelBuffer::I32(v) => v.len(),
            PixelBuffer::F32(v) => v.len(),
            PixelBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            PixelBuffer::U8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PixelBuffer::U16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PixelBuffer::I16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PixelBuffer::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PixelBuffer::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PixelBuffer::F64(v) => v.clone(),
        }
    }

    /// Serialize to big-endian FITS data bytes, without block padding.
    ///
    /// With `unsigned_offset`, `u16` values are stored as `v - 32768`, to be
    /// read back with `BZERO = 32768`. Otherwise they are stored bit for bit.
    pub fn to_be_bytes(&self, unsigned_offset: bool) -> Vec<u8> {
        let (mut buf, width): (Vec<u8>, usize) = match self {
            PixelBuffer::U8(v) => return v.clone(),
            PixelBuffer::U16(v) if unsigned_offset => {
                let shifted: Vec<u16> = v.iter().map(|&x| x ^ 0x8000).collect();
                (pod_collect_to_vec(&shifted), 2)
            }
            PixelBuffer::U16(v) => (pod_collect_to_vec(v), 2),
            PixelBuffer::I16(v) => (pod_collect_to_vec(v), 2),
            PixelBuffer::I32(v) => (pod_collect_to_vec(v), 4),
            PixelBuffer::F32(v) => (pod_collect_to_vec(v), 4),
            PixelBuffer::F64(v) => (pod_collect_to_vec(v), 8),
        };
        native_to_be(&mut buf, width);
        buf
    }

    /// Shape the buffer as `[channels?, ..., height, width]`, widened to
    /// `f64`. A single channel adds no axis.
    #[cfg(feature = "array")]
    pub fn to_array(&self, dimensions: &[usize], channels: usize) -> Result<ndarray::ArrayD<f64>> {
        let mut shape: Vec<usize> = dimensions.iter().rev().copied().collect();
        if channels > 1 {
            shape.insert(0, channels);
        }
        ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), self.to_f64_vec())
            .map_err(|e| Error::Internal(format!("pixel buffer does not fit its shape: {e}")))
    }
}

/// Summary of the reconstructed values.
///
/// Non-finite float samples are counted in `count` but excluded from
/// `min`, `max` and `mean`. UInt64 sources are summarized after conversion
/// to `f64`, so extremes above 2^53 carry the same rounding as the pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Samples equal to the maximum of the source sample format.
    pub saturated: usize,
    pub count: usize,
}

#[derive(Default)]
struct Accumulator {
    min: f64,
    max: f64,
    sum: f64,
    finite: usize,
    saturated: usize,
    count: usize,
}

impl Accumulator {
    #[inline]
    fn observe(&mut self, v: f64, at_ceiling: bool) {
        self.count += 1;
        if at_ceiling {
            self.saturated += 1;
        }
        if !v.is_finite() {
            return;
        }
        if self.finite == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.sum += v;
        self.finite += 1;
    }

    fn finish(self) -> Statistics {
        let (min, max, mean) = if self.finite == 0 {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            (self.min, self.max, self.sum / self.finite as f64)
        };
        Statistics {
            min,
            max,
            mean,
            saturated: self.saturated,
            count: self.count,
        }
    }
}

/// Reorder interleaved samples (`p0c0 p0c1 ... p1c0 ...`) into planar order.
fn deinterleave(bytes: &[u8], channels: usize, width: usize) -> Vec<u8> {
    let pixels = bytes.len() / (channels * width);
    let mut out = vec![0u8; bytes.len()];
    for (p, pixel) in bytes.chunks_exact(channels * width).enumerate() {
        for (c, sample) in pixel.chunks_exact(width).enumerate() {
            let at = (c * pixels + p) * width;
            out[at..at + width].copy_from_slice(sample);
        }
    }
    out
}

/// Interpret a decoded data block according to `desc`.
pub fn reconstruct(data: &[u8], desc: &ImageDescriptor) -> Result<(PixelBuffer, Statistics)> {
    let format = desc.sample_format;
    let expected = desc.expected_size();
    if data.len() != expected {
        return Err(Error::Validation {
            image: desc.index,
            field: "pixel data",
            expected,
            actual: data.len(),
        });
    }

    let mut bytes = match desc.pixel_storage {
        PixelStorage::Normal if desc.channel_count > 1 => {
            deinterleave(data, desc.channel_count, format.byte_width())
        }
        _ => data.to_vec(),
    };
    match desc.byte_order {
        ByteOrder::Little => le_to_native(&mut bytes, format.scalar_width()),
        ByteOrder::Big => be_to_native(&mut bytes, format.scalar_width()),
    }

    let mut acc = Accumulator::default();
    let pixels = match format {
        SampleFormat::UInt8 => {
            for &v in &bytes {
                acc.observe(f64::from(v), v == u8::MAX);
            }
            PixelBuffer::U8(bytes)
        }
        SampleFormat::UInt16 => {
            let v: Vec<u16> = pod_collect_to_vec(&bytes);
            for &x in &v {
                acc.observe(f64::from(x), x == u16::MAX);
            }
            PixelBuffer::U16(v)
        }
        SampleFormat::Int16 => {
            let v: Vec<i16> = pod_collect_to_vec(&bytes);
            for &x in &v {
                acc.observe(f64::from(x), x == i16::MAX);
            }
            PixelBuffer::I16(v)
        }
        SampleFormat::Int32 => {
            let v: Vec<i32> = pod_collect_to_vec(&bytes);
            for &x in &v {
                acc.observe(f64::from(x), x == i32::MAX);
            }
            PixelBuffer::I32(v)
        }
        SampleFormat::UInt32 => {
            let v: Vec<u32> = pod_collect_to_vec(&bytes);
            let fits_i32 = v.iter().all(|&x| i32::try_from(x).is_ok());
            for &x in &v {
                acc.observe(f64::from(x), x == u32::MAX);
            }
            if fits_i32 {
                PixelBuffer::I32(v.into_iter().map(|x| x as i32).collect())
            } else {
                tracing::debug!(
                    "image {}: UInt32 values exceed i32 range, writing Float32",
                    desc.index
                );
                PixelBuffer::F32(v.into_iter().map(|x| x as f32).collect())
            }
        }
        SampleFormat::UInt64 => {
            let v: Vec<u64> = pod_collect_to_vec(&bytes);
            PixelBuffer::F64(
                v.into_iter()
                    .map(|x| {
                        let f = x as f64;
                        acc.observe(f, x == u64::MAX);
                        f
                    })
                    .collect(),
            )
        }
        SampleFormat::Float32 => {
            let v: Vec<f32> = pod_collect_to_vec(&bytes);
            for &x in &v {
                acc.observe(f64::from(x), x == f32::MAX);
            }
            PixelBuffer::F32(v)
        }
        SampleFormat::Float64 => {
            let v: Vec<f64> = pod_collect_to_vec(&bytes);
            for &x in &v {
                acc.observe(x, x == f64::MAX);
            }
            PixelBuffer::F64(v)
        }
        SampleFormat::Complex32 => {
            let parts: Vec<f32> = pod_collect_to_vec(&bytes);
            PixelBuffer::F32(
                parts
                    .chunks_exact(2)
                    .map(|p| {
                        let m = libm::hypotf(p[0], p[1]);
                        acc.observe(f64::from(m), m == f32::MAX);
                        m
                    })
                    .collect(),
            )
        }
        SampleFormat::Complex64 => {
            let parts: Vec<f64> = pod_collect_to_vec(&bytes);
            PixelBuffer::F64(
                parts
                    .chunks_exact(2)
                    .map(|p| {
                        let m = libm::hypot(p[0], p[1]);
                        acc.observe(m, m == f64::MAX);
                        m
                    })
                    .collect(),
            )
        }
    };

    if pixels.len() != desc.element_count() {
        return Err(Error::Internal(format!(
            "image {}: reconstructed {} samples, geometry declares {}",
            desc.index,
            pixels.len(),
            desc.element_count()
        )));
    }

    let stats = acc.finish();
    tracing::debug!(
        "image {}: {} {} samples as {}, min {} max {} mean {:.3} saturated {}",
        desc.index,
        stats.count,
        format,
        pixels.type_name(),
        stats.min,
        stats.max,
        stats.mean,
        stats.saturated
    );
    Ok((pixels, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColorSpace, DataLocation};

    fn desc(format: SampleFormat, dims: &[usize], channels: usize) -> ImageDescriptor {
        ImageDescriptor {
            index: 0,
            id: None,
            geometry: String::new(),
            dimensions: dims.to_vec(),
            channel_count: channels,
            sample_format: format,
            color_space: if channels >= 3 {
                ColorSpace::Rgb
            } else {
                ColorSpace::Gray
            },
            pixel_storage: PixelStorage::Planar,
            byte_order: ByteOrder::Little,
            compression: None,
            location: DataLocation::Attachment {
                offset: 0,
                length: 0,
            },
            checksum: None,
            keywords: Vec::new(),
            properties: Vec::new(),
        }
    }

    fn le<T: bytemuck::NoUninit>(values: &[T]) -> Vec<u8> {
        let mut out: Vec<u8> = pod_collect_to_vec(values);
        if cfg!(target_endian = "big") {
            crate::endian::swap_each(&mut out, core::mem::size_of::<T>());
        }
        out
    }

    #[test]
    fn u16_values_preserved() {
        let values: Vec<u16> = (0..16).collect();
        let (pixels, stats) =
            reconstruct(&le(&values), &desc(SampleFormat::UInt16, &[4, 4], 1)).unwrap();
        assert_eq!(pixels, PixelBuffer::U16(values));
        assert_eq!(pixels.bitpix(), 16);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 15.0);
        assert_eq!(stats.mean, 7.5);
        assert_eq!(stats.count, 16);
        assert_eq!(stats.saturated, 0);
    }

    #[test]
    fn constant_value_for_every_format() {
        let n = 6;
        let cases: Vec<(SampleFormat, Vec<u8>, f64, i64)> = vec![
            (SampleFormat::UInt8, vec![200u8; n], 200.0, 8),
            (SampleFormat::UInt16, le(&[40_000u16; 6]), 40_000.0, 16),
            (SampleFormat::Int16, le(&[-1234i16; 6]), -1234.0, 16),
            (SampleFormat::UInt32, le(&[70_000u32; 6]), 70_000.0, 32),
            (SampleFormat::Int32, le(&[-70_000i32; 6]), -70_000.0, 32),
            (SampleFormat::UInt64, le(&[1u64 << 40; 6]), (1u64 << 40) as f64, -64),
            (SampleFormat::Float32, le(&[0.25f32; 6]), 0.25, -32),
            (SampleFormat::Float64, le(&[-3.5f64; 6]), -3.5, -64),
            (SampleFormat::Complex32, le(&[3.0f32, 4.0].repeat(6)), 5.0, -32),
            (SampleFormat::Complex64, le(&[6.0f64, 8.0].repeat(6)), 10.0, -64),
        ];
        for (format, bytes, value, bitpix) in cases {
            let (pixels, stats) = reconstruct(&bytes, &desc(format, &[3, 2], 1)).unwrap();
            assert_eq!(pixels.len(), n, "{format}");
            assert_eq!(pixels.bitpix(), bitpix, "{format}");
            assert!(pixels.to_f64_vec().iter().all(|&v| v == value), "{format}");
            assert_eq!(stats.min, value, "{format}");
            assert_eq!(stats.max, value, "{format}");
        }
    }

    #[test]
    fn uint32_promotion_depends_on_range() {
        let d = desc(SampleFormat::UInt32, &[2], 1);
        let (pixels, _) = reconstruct(&le(&[1u32, i32::MAX as u32]), &d).unwrap();
        assert_eq!(pixels, PixelBuffer::I32(vec![1, i32::MAX]));

        let (pixels, stats) = reconstruct(&le(&[1u32, u32::MAX]), &d).unwrap();
        assert_eq!(pixels.bitpix(), -32);
        assert_eq!(stats.max, f64::from(u32::MAX));
        assert_eq!(stats.saturated, 1);
    }

    #[test]
    fn uint64_beyond_2_pow_53() {
        let big = (1u64 << 53) + 1;
        let values = [3u64, big, u64::MAX];
        let (pixels, stats) =
            reconstruct(&le(&values), &desc(SampleFormat::UInt64, &[3], 1)).unwrap();
        match pixels {
            PixelBuffer::F64(v) => {
                assert_eq!(v[0], 3.0);
                // Round to nearest even: 2^53 + 1 becomes 2^53.
                assert_eq!(v[1], 9_007_199_254_740_992.0);
                assert_eq!(v[2], u64::MAX as f64);
            }
            other => panic!("expected F64, got {other:?}"),
        }
        assert_eq!(stats.max, u64::MAX as f64);
        assert_eq!(stats.saturated, 1);
    }

    #[test]
    fn big_endian_samples() {
        let mut d = desc(SampleFormat::Int32, &[2], 1);
        d.byte_order = ByteOrder::Big;
        let bytes: Vec<u8> = [-2i32, 0x0102_0304]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let (pixels, _) = reconstruct(&bytes, &d).unwrap();
        assert_eq!(pixels, PixelBuffer::I32(vec![-2, 0x0102_0304]));
    }

    #[test]
    fn big_endian_complex_swaps_components() {
        let mut d = desc(SampleFormat::Complex32, &[1], 1);
        d.byte_order = ByteOrder::Big;
        let bytes: Vec<u8> = [3.0f32, -4.0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let (pixels, _) = reconstruct(&bytes, &d).unwrap();
        assert_eq!(pixels, PixelBuffer::F32(vec![5.0]));
    }

    #[test]
    fn interleaved_channels_become_planar() {
        let mut d = desc(SampleFormat::UInt16, &[2, 1], 3);
        d.pixel_storage = PixelStorage::Normal;
        // Pixel 0 = (1, 2, 3), pixel 1 = (4, 5, 6).
        let (pixels, _) = reconstruct(&le(&[1u16, 2, 3, 4, 5, 6]), &d).unwrap();
        assert_eq!(pixels, PixelBuffer::U16(vec![1, 4, 2, 5, 3, 6]));
    }

    #[test]
    fn planar_channels_untouched() {
        let d = desc(SampleFormat::UInt8, &[2, 1], 3);
        let (pixels, _) = reconstruct(&[1, 4, 2, 5, 3, 6], &d).unwrap();
        assert_eq!(pixels, PixelBuffer::U8(vec![1, 4, 2, 5, 3, 6]));
    }

    #[test]
    fn saturation_counts() {
        let d = desc(SampleFormat::UInt8, &[5], 1);
        let (_, stats) = reconstruct(&[255, 0, 255, 17, 255], &d).unwrap();
        assert_eq!(stats.saturated, 3);
    }

    #[test]
    fn non_finite_floats_excluded_from_extremes() {
        let d = desc(SampleFormat::Float32, &[4], 1);
        let (_, stats) = reconstruct(&le(&[1.0f32, f32::NAN, 3.0, f32::INFINITY]), &d).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
    }

    #[test]
    fn wrong_length_is_validation_error() {
        let d = desc(SampleFormat::UInt16, &[4, 4], 1);
        assert!(matches!(
            reconstruct(&[0u8; 30], &d),
            Err(Error::Validation {
                expected: 32,
                actual: 30,
                ..
            })
        ));
    }

    #[test]
    fn be_bytes_per_type() {
        assert_eq!(PixelBuffer::U8(vec![1, 2]).to_be_bytes(false), vec![1, 2]);
        assert_eq!(
            PixelBuffer::I16(vec![-2]).to_be_bytes(false),
            vec![0xFF, 0xFE]
        );
        assert_eq!(
            PixelBuffer::U16(vec![0x1234]).to_be_bytes(false),
            vec![0x12, 0x34]
        );
        assert_eq!(
            PixelBuffer::F64(vec![1.0]).to_be_bytes(false),
            1.0f64.to_be_bytes().to_vec()
        );
    }

    #[test]
    fn be_bytes_unsigned_offset() {
        // 0 -> -32768, 65535 -> 32767
        let buf = PixelBuffer::U16(vec![0, 32768, 65535]);
        assert_eq!(buf.to_be_bytes(true), vec![0x80, 0x00, 0x00, 0x00, 0x7F, 0xFF]);
    }

    #[cfg(feature = "array")]
    #[test]
    fn array_shape_is_row_major() {
        let buf = PixelBuffer::U8((0..12).collect());
        let arr = buf.to_array(&[2, 2], 3).unwrap();
        assert_eq!(arr.shape(), &[3, 2, 2]);
        assert_eq!(arr[&[1, 0, 1][..]], 5.0);

        let arr = PixelBuffer::U8((0..6).collect()).to_array(&[3, 2], 1).unwrap();
        assert_eq!(arr.shape(), &[2, 3]);
    }
}
