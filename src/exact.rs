use crate::image::PixelBuffer;
use crate::PdiffError;

/// Whether every packed pixel of `a` equals the one of `b`.
///
/// Row padding is ignored, so buffers with different strides can still be
/// identical. Buffers of different sizes never are.
#[must_use]
pub fn binary_identical(a: &PixelBuffer<'_>, b: &PixelBuffer<'_>) -> bool {
    if a.width() != b.width() || a.height() != b.height() {
        return false;
    }
    (0..a.height()).all(|y| a.row(y).eq(b.row(y)))
}

/// Result of an exact, channel-by-channel comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDiff {
    /// Pixels whose packed value differs.
    pub pixels_changed: usize,
    /// Largest absolute difference of any single channel.
    pub max_diff: u8,
    /// Opaque ARGB visualization, `width * height` pixels, row-major.
    ///
    /// Unchanged pixels are black; for changed ones each channel difference
    /// is amplified 4x and offset by 128 so small errors stay visible.
    pub image: Vec<u32>,
}

/// Compares two buffers exactly and renders where they differ.
///
/// # Errors
/// - If the dimensions differ
pub fn buffer_diff(a: &PixelBuffer<'_>, b: &PixelBuffer<'_>) -> Result<BufferDiff, PdiffError> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(PdiffError::DimensionMismatch {
            w1: a.width(),
            h1: a.height(),
            w2: b.width(),
            h2: b.height(),
        });
    }

    let mut image = Vec::new();
    image.try_reserve_exact(a.len())?;
    let mut pixels_changed = 0;
    let mut max_diff = 0u8;

    for y in 0..a.height() {
        for (pa, pb) in a.row(y).zip(b.row(y)) {
            if pa == pb {
                image.push(0xff00_0000);
                continue;
            }

            let mut diff_pixel = 0u32;
            for channel in 0..4 {
                let shift = channel * 8;
                let va = ((pa >> shift) & 0xff) as u8;
                let vb = ((pb >> shift) & 0xff) as u8;
                let diff = va.abs_diff(vb);
                max_diff = max_diff.max(diff);
                let shown = if diff == 0 {
                    0
                } else {
                    (u32::from(diff) * 4 + 128).min(255)
                };
                diff_pixel |= shown << shift;
            }

            pixels_changed += 1;
            if diff_pixel & 0x00ff_ffff == 0 {
                // alpha only, show it as grey
                diff_pixel = (diff_pixel >> 24) * 0x0001_0101;
            }
            image.push(diff_pixel | 0xff00_0000);
        }
    }

    Ok(BufferDiff {
        pixels_changed,
        max_diff,
        image,
    })
}
