mod consts {
    #![allow(clippy::unreadable_literal)]
    include!(concat!(env!("OUT_DIR"), "/pyramid_kernel.rs"));
}

use crate::{alloc_plane, PdiffError};

/// Number of levels in every [`Pyramid`].
pub const MAX_PYR_LEVELS: usize = 8;

/// Stack of successively blurred copies of a single-channel image.
///
/// All levels keep the resolution of the source, so `(x, y)` addresses the
/// same spatial location at every scale. Level 0 is the source itself and
/// level `k` is level `k - 1` convolved with a normalized 5x5 low pass kernel
/// using a mirrored boundary.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: [Vec<f32>; MAX_PYR_LEVELS],
    width: usize,
    height: usize,
}

impl Pyramid {
    /// Builds the pyramid for a `width` x `height` row-major image.
    ///
    /// # Errors
    /// - If a level plane cannot be allocated
    ///
    /// # Panics
    /// - If `image.len()` is not `width * height`
    #[tracing::instrument(level = "trace", skip(image))]
    pub fn new(image: &[f32], width: usize, height: usize) -> Result<Self, PdiffError> {
        assert_eq!(image.len(), width * height);

        let mut levels: [Vec<f32>; MAX_PYR_LEVELS] = Default::default();
        for i in 0..MAX_PYR_LEVELS {
            let mut level = alloc_plane(image.len())?;
            if i == 0 {
                level.copy_from_slice(image);
            } else {
                convolve(&levels[i - 1], &mut level, width, height);
            }
            levels[i] = level;
        }

        Ok(Self {
            levels,
            width,
            height,
        })
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Returns the value stored at `(x, y)` of the given level.
    ///
    /// # Panics
    /// - If `level >= MAX_PYR_LEVELS` or `(x, y)` lies outside the image
    #[inline(always)]
    #[must_use]
    pub fn value(&self, x: usize, y: usize, level: usize) -> f32 {
        assert!(
            level < MAX_PYR_LEVELS,
            "pyramid level {level} out of range (max {})",
            MAX_PYR_LEVELS - 1
        );
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} pyramid",
            self.width,
            self.height
        );
        self.levels[level][y * self.width + x]
    }

    /// Non-panicking form of [`value`][Self::value].
    #[must_use]
    pub fn get(&self, x: usize, y: usize, level: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.levels
            .get(level)
            .map(|plane| plane[y * self.width + x])
    }

    /// Returns a whole level as a row-major plane.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<&[f32]> {
        self.levels.get(level).map(Vec::as_slice)
    }
}

/// Mirrors `i` into `0..len` without repeating the edge sample, so `-1` maps
/// to `1` and `len` maps to `len - 2`.
///
/// Images narrower than the kernel reflect repeatedly (period `2 * len - 2`).
#[inline(always)]
pub(crate) fn reflect(i: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }
    let period = 2 * len as isize - 2;
    let r = i.rem_euclid(period) as usize;
    if r < len {
        r
    } else {
        period as usize - r
    }
}

fn convolve(input: &[f32], output: &mut [f32], width: usize, height: usize) {
    assert_eq!(input.len(), output.len());
    if width == 0 || height == 0 {
        return;
    }

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        output
            .par_chunks_exact_mut(width)
            .enumerate()
            .for_each(|(y, row)| convolve_row(input, row, y, width, height));
    }

    #[cfg(not(feature = "rayon"))]
    {
        output
            .chunks_exact_mut(width)
            .enumerate()
            .for_each(|(y, row)| convolve_row(input, row, y, width, height));
    }
}

#[inline(always)]
fn convolve_row(input: &[f32], output: &mut [f32], y: usize, width: usize, height: usize) {
    let r = consts::KERNEL_RADIUS as isize;
    let taps = 2 * consts::KERNEL_RADIUS + 1;

    for (x, out) in output.iter_mut().enumerate() {
        let mut acc = 0f32;
        for dy in -r..=r {
            let ny = reflect(y as isize + dy, height);
            let src_row = &input[ny * width..(ny + 1) * width];
            let k_row = &consts::KERNEL_2D[(dy + r) as usize * taps..];
            for dx in -r..=r {
                let nx = reflect(x as isize + dx, width);
                acc = k_row[(dx + r) as usize].mul_add(src_row[nx], acc);
            }
        }
        *out = acc;
    }
}
