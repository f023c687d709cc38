#![deny(clippy::all)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::default_numeric_fallback)]
#![warn(clippy::exit)]
#![warn(clippy::float_cmp_const)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::lossy_float_literal)]
#![warn(clippy::map_err_ignore)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::multiple_inherent_impl)]
#![warn(clippy::pattern_type_mismatch)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::same_name_method)]
#![warn(clippy::str_to_string)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::unneeded_field_pattern)]
#![warn(clippy::verbose_file_reads)]

//! Perceptual image comparison after Yee, "A Perceptual Metric for
//! Production Testing" (2004).
//!
//! Two renderings that differ only by anti-aliasing or rounding noise are
//! reported as matching, while differences a viewer would notice are counted
//! per pixel and checked against a tolerance.
//!
//! ```rust
//! use perceptualdiff::{compare, PdiffParams, PixelBuffer};
//!
//! let black = vec![0u8; 2 * 2 * 4];
//! let a = PixelBuffer::packed(&black, 2, 2)?;
//! let verdict = compare(&a, &a, &PdiffParams::default())?;
//! assert!(verdict.matches);
//! assert_eq!(verdict.pixels_failed, 0);
//! # Ok::<(), perceptualdiff::PdiffError>(())
//! ```

mod color;
mod compare;
mod csf;
mod exact;
mod image;
pub mod pyramid;

use std::collections::TryReserveError;

use thiserror::Error;

pub use color::PerceptualImage;
pub use compare::DiffMap;
pub use exact::{binary_identical, buffer_diff, BufferDiff};
pub use image::{unpremultiply, PixelBuffer};
pub use pyramid::{Pyramid, MAX_PYR_LEVELS};

use compare::Comparator;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PdiffError {
    #[error("image dimensions do not match: {w1}x{h1} vs {w2}x{h2}")]
    DimensionMismatch {
        w1: usize,
        h1: usize,
        w2: usize,
        h2: usize,
    },
    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },
    #[error("row stride of {stride} bytes cannot hold {width} pixels")]
    InvalidStride { width: usize, stride: usize },
    #[error("pixel buffer holds {actual} bytes, {expected} are required")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("image of {width}x{height} pixels is too large")]
    ImageTooLarge { width: usize, height: usize },
    #[error("out of memory allocating image planes")]
    OutOfMemory(#[from] TryReserveError),
}

/// Allocates a zeroed plane, reporting allocation failure instead of
/// aborting.
pub(crate) fn alloc_plane<T: Clone + Default>(len: usize) -> Result<Vec<T>, PdiffError> {
    let mut plane = Vec::new();
    plane.try_reserve_exact(len)?;
    plane.resize(len, T::default());
    Ok(plane)
}

/// Viewing conditions and tolerance for a comparison.
///
/// ```rust
/// use perceptualdiff::PdiffParams;
///
/// let params = PdiffParams::new()
///     .with_field_of_view(60.0)
///     .with_threshold_pixels(0)
///     .with_compute_map(true);
/// assert_eq!(params.gamma(), 2.2);
/// ```
#[derive(Debug, Clone)]
pub struct PdiffParams {
    gamma: f32,
    luminance: f32,
    field_of_view: f32,
    threshold_pixels: usize,
    compute_map: bool,
}

impl Default for PdiffParams {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            luminance: 100.0,
            field_of_view: 45.0,
            threshold_pixels: 100,
            compute_map: false,
        }
    }
}

impl PdiffParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Display gamma used to decode the stored 8-bit values.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Peak display luminance in cd/m².
    #[must_use]
    pub fn with_luminance(mut self, luminance: f32) -> Self {
        self.luminance = luminance;
        self
    }

    /// Horizontal viewing angle of the whole image, in degrees.
    #[must_use]
    pub fn with_field_of_view(mut self, field_of_view: f32) -> Self {
        self.field_of_view = field_of_view;
        self
    }

    /// Images match while fewer than this many pixels fail.
    #[must_use]
    pub fn with_threshold_pixels(mut self, threshold_pixels: usize) -> Self {
        self.threshold_pixels = threshold_pixels;
        self
    }

    /// Whether to return a [`DiffMap`] of the failing pixels.
    #[must_use]
    pub fn with_compute_map(mut self, compute_map: bool) -> Self {
        self.compute_map = compute_map;
        self
    }

    #[must_use]
    pub const fn gamma(&self) -> f32 {
        self.gamma
    }

    #[must_use]
    pub const fn luminance(&self) -> f32 {
        self.luminance
    }

    #[must_use]
    pub const fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    #[must_use]
    pub const fn threshold_pixels(&self) -> usize {
        self.threshold_pixels
    }

    #[must_use]
    pub const fn compute_map(&self) -> bool {
        self.compute_map
    }

    /// Checks the viewing parameters.
    ///
    /// # Errors
    /// - If gamma or luminance is not a finite positive number
    /// - If the field of view is not within (0, 180) degrees
    pub fn validate(&self) -> Result<(), PdiffError> {
        let positive = |name: &'static str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PdiffError::InvalidParameter { name, value })
            }
        };
        positive("gamma", self.gamma)?;
        positive("luminance", self.luminance)?;
        positive("field of view", self.field_of_view)?;
        if self.field_of_view >= 180.0 {
            return Err(PdiffError::InvalidParameter {
                name: "field of view",
                value: self.field_of_view,
            });
        }
        Ok(())
    }
}

/// Outcome of the perceptual comparator alone.
#[derive(Debug, Clone)]
pub struct PerceptualDiff {
    pub pixels_failed: usize,
    /// Present when [`PdiffParams::with_compute_map`] was set.
    pub map: Option<DiffMap>,
}

/// Final answer of [`compare`].
#[derive(Debug, Clone)]
pub struct Verdict {
    /// The images are the same to a human observer.
    pub matches: bool,
    /// The pixel data is bit-for-bit equal; the comparator was skipped.
    pub binary_identical: bool,
    pub pixels_failed: usize,
    /// Present when [`PdiffParams::with_compute_map`] was set.
    pub map: Option<DiffMap>,
}

/// Decides whether two images look the same.
///
/// Bit-identical images match without running the perceptual metric.
/// Otherwise they match when fewer than
/// [`threshold_pixels`][PdiffParams::threshold_pixels] pixels fail it.
///
/// # Errors
/// - If the parameters are invalid
/// - If the image dimensions differ
/// - If the intermediate planes cannot be allocated
pub fn compare(
    a: &PixelBuffer<'_>,
    b: &PixelBuffer<'_>,
    params: &PdiffParams,
) -> Result<Verdict, PdiffError> {
    params.validate()?;
    check_dimensions(a, b)?;

    if binary_identical(a, b) {
        tracing::debug!("images are binary identical");
        let map = if params.compute_map {
            Some(DiffMap::from_vec(
                alloc_plane(a.len())?,
                a.width(),
                a.height(),
            ))
        } else {
            None
        };
        return Ok(Verdict {
            matches: true,
            binary_identical: true,
            pixels_failed: 0,
            map,
        });
    }

    let diff = run_comparator(a, b, params)?;
    let matches = diff.pixels_failed < params.threshold_pixels;
    tracing::debug!(
        pixels_failed = diff.pixels_failed,
        threshold = params.threshold_pixels,
        matches,
        "perceptual comparison finished"
    );

    Ok(Verdict {
        matches,
        binary_identical: false,
        pixels_failed: diff.pixels_failed,
        map: diff.map,
    })
}

/// Runs the perceptual metric without the bit-identical shortcut.
///
/// # Errors
/// - If the parameters are invalid
/// - If the image dimensions differ
/// - If the intermediate planes cannot be allocated
pub fn perceptual_diff(
    a: &PixelBuffer<'_>,
    b: &PixelBuffer<'_>,
    params: &PdiffParams,
) -> Result<PerceptualDiff, PdiffError> {
    params.validate()?;
    check_dimensions(a, b)?;
    run_comparator(a, b, params)
}

fn check_dimensions(a: &PixelBuffer<'_>, b: &PixelBuffer<'_>) -> Result<(), PdiffError> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(PdiffError::DimensionMismatch {
            w1: a.width(),
            h1: a.height(),
            w2: b.width(),
            h2: b.height(),
        });
    }
    Ok(())
}

#[tracing::instrument(level = "trace", skip_all, fields(width = a.width(), height = a.height()))]
fn run_comparator(
    a: &PixelBuffer<'_>,
    b: &PixelBuffer<'_>,
    params: &PdiffParams,
) -> Result<PerceptualDiff, PdiffError> {
    let (width, height) = (a.width(), a.height());

    let img_a = PerceptualImage::from_buffer(a, params.gamma, params.luminance)?;
    let img_b = PerceptualImage::from_buffer(b, params.gamma, params.luminance)?;

    let pyr_a = Pyramid::new(&img_a.luminance, width, height)?;
    let pyr_b = Pyramid::new(&img_b.luminance, width, height)?;

    let comparator = Comparator::new(&pyr_a, &pyr_b, &img_a, &img_b, params.field_of_view);

    let (pixels_failed, map) = if params.compute_map {
        let mut flags = alloc_plane(width * height)?;
        let failed = comparator.count_failed(Some(&mut flags));
        (failed, Some(DiffMap::from_vec(flags, width, height)))
    } else {
        (comparator.count_failed(None), None)
    };

    Ok(PerceptualDiff { pixels_failed, map })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(pixels: &[u32]) -> Vec<u8> {
        pixels.iter().flat_map(|p| p.to_ne_bytes()).collect()
    }

    #[test]
    fn black_square_matches_itself() {
        let data = bytes(&[0; 4]);
        let buf = PixelBuffer::packed(&data, 2, 2).unwrap();
        let params = PdiffParams::default()
            .with_gamma(2.2)
            .with_luminance(100.0)
            .with_field_of_view(45.0)
            .with_threshold_pixels(100);

        let verdict = compare(&buf, &buf, &params).unwrap();
        assert!(verdict.matches);
        assert!(verdict.binary_identical);
        assert_eq!(verdict.pixels_failed, 0);

        let diff = perceptual_diff(&buf, &buf, &params).unwrap();
        assert_eq!(diff.pixels_failed, 0);
    }

    #[test]
    fn white_corner_fails_with_zero_threshold() {
        let black = bytes(&[0; 4]);
        let corner = bytes(&[0xffff_ffff, 0, 0, 0]);
        let a = PixelBuffer::packed(&black, 2, 2).unwrap();
        let b = PixelBuffer::packed(&corner, 2, 2).unwrap();
        let params = PdiffParams::default()
            .with_threshold_pixels(0)
            .with_compute_map(true);

        let verdict = compare(&a, &b, &params).unwrap();
        assert!(!verdict.matches);
        assert!(!verdict.binary_identical);
        assert!(verdict.pixels_failed >= 1);
        let map = verdict.map.unwrap();
        assert!(map.is_different(0, 0));
        assert_eq!(map.count(), verdict.pixels_failed);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let small = bytes(&[0; 16]);
        let large = bytes(&[0; 64]);
        let a = PixelBuffer::packed(&small, 4, 4).unwrap();
        let b = PixelBuffer::packed(&large, 8, 8).unwrap();
        let err = compare(&a, &b, &PdiffParams::default()).unwrap_err();
        assert_eq!(
            err,
            PdiffError::DimensionMismatch {
                w1: 4,
                h1: 4,
                w2: 8,
                h2: 8
            }
        );
        assert!(perceptual_diff(&a, &b, &PdiffParams::default()).is_err());
    }

    #[test]
    fn invalid_parameters_are_rejected_up_front() {
        let data = bytes(&[0; 4]);
        let buf = PixelBuffer::packed(&data, 2, 2).unwrap();
        let cases = [
            PdiffParams::default().with_gamma(0.0),
            PdiffParams::default().with_gamma(f32::NAN),
            PdiffParams::default().with_luminance(-1.0),
            PdiffParams::default().with_field_of_view(0.0),
            PdiffParams::default().with_field_of_view(180.0),
        ];
        for params in &cases {
            assert!(
                matches!(
                    compare(&buf, &buf, params),
                    Err(PdiffError::InvalidParameter { .. })
                ),
                "{params:?}"
            );
        }
    }

    #[test]
    fn identical_images_get_an_empty_map() {
        let data = bytes(&[0xff12_3456; 6]);
        let buf = PixelBuffer::packed(&data, 3, 2).unwrap();
        let params = PdiffParams::default().with_compute_map(true);
        let verdict = compare(&buf, &buf, &params).unwrap();
        let map = verdict.map.unwrap();
        assert_eq!((map.width(), map.height()), (3, 2));
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn empty_images_match() {
        let buf = PixelBuffer::packed(&[], 0, 0).unwrap();
        let verdict = compare(&buf, &buf, &PdiffParams::default()).unwrap();
        assert!(verdict.matches);
        let diff = perceptual_diff(&buf, &buf, &PdiffParams::default()).unwrap();
        assert_eq!(diff.pixels_failed, 0);
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = PdiffError::DimensionMismatch {
            w1: 4,
            h1: 4,
            w2: 8,
            h2: 8,
        };
        assert_eq!(err.to_string(), "image dimensions do not match: 4x4 vs 8x8");
        let err = PdiffError::InvalidParameter {
            name: "gamma",
            value: 0.0,
        };
        assert!(err.to_string().contains("gamma"));
    }
}
