use num_traits::clamp;

use crate::color::PerceptualImage;
use crate::csf::{csf, mask, tvi, SpatialBands, BANDS};
use crate::pyramid::Pyramid;

/// Floor for contrast denominators and adaptation luminance.
const MIN_LUMINANCE: f32 = 1e-5;
/// Bounds of the masking elevation applied to both thresholds.
const MIN_FACTOR: f32 = 1.0;
const MAX_FACTOR: f32 = 10.0;
/// Below this adaptation luminance (cd/m²) cones lose color sensitivity.
const SCOTOPIC_LUMINANCE: f32 = 10.0;

/// Per-pixel pass/fail grid produced when the map is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffMap {
    data: Vec<bool>,
    width: usize,
    height: usize,
}

impl DiffMap {
    pub(crate) fn from_vec(data: Vec<bool>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Whether the pixel at `(x, y)` is perceptibly different.
    ///
    /// # Panics
    /// - If `(x, y)` lies outside the map
    #[must_use]
    pub fn is_different(&self, x: usize, y: usize) -> bool {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x]
    }

    /// Row-major flags, `true` for failing pixels.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Number of failing pixels in the map.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&failed| failed).count()
    }
}

/// Classifies every pixel of two images as perceptibly equal or not.
pub(crate) struct Comparator<'a> {
    pyr_a: &'a Pyramid,
    pyr_b: &'a Pyramid,
    img_a: &'a PerceptualImage,
    img_b: &'a PerceptualImage,
    bands: SpatialBands,
}

impl<'a> Comparator<'a> {
    pub fn new(
        pyr_a: &'a Pyramid,
        pyr_b: &'a Pyramid,
        img_a: &'a PerceptualImage,
        img_b: &'a PerceptualImage,
        field_of_view: f32,
    ) -> Self {
        let dims = (pyr_a.width(), pyr_a.height());
        assert_eq!(dims, (pyr_b.width(), pyr_b.height()));
        assert_eq!(dims, (img_a.width(), img_a.height()));
        assert_eq!(dims, (img_b.width(), img_b.height()));

        let bands = SpatialBands::new(pyr_a.width(), field_of_view);
        tracing::debug!(
            adaptation_level = bands.adaptation_level,
            top_cpd = bands.cpd[0],
            "viewing bands"
        );

        Self {
            pyr_a,
            pyr_b,
            img_a,
            img_b,
            bands,
        }
    }

    /// Counts failing pixels, marking them in `map` when one is given.
    ///
    /// `map` must hold `width * height` entries.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn count_failed(&self, map: Option<&mut [bool]>) -> usize {
        let width = self.pyr_a.width();
        let height = self.pyr_a.height();
        if width == 0 || height == 0 {
            return 0;
        }

        match map {
            Some(map) => {
                assert_eq!(map.len(), width * height);
                self.classify_into(map, width)
            }
            None => self.classify_rows(height),
        }
    }

    #[cfg(feature = "rayon")]
    fn classify_into(&self, map: &mut [bool], width: usize) -> usize {
        use rayon::prelude::*;
        map.par_chunks_exact_mut(width)
            .enumerate()
            .map(|(y, row)| self.classify_row(y, Some(row)))
            .sum()
    }

    #[cfg(not(feature = "rayon"))]
    fn classify_into(&self, map: &mut [bool], width: usize) -> usize {
        map.chunks_exact_mut(width)
            .enumerate()
            .map(|(y, row)| self.classify_row(y, Some(row)))
            .sum()
    }

    #[cfg(feature = "rayon")]
    fn classify_rows(&self, height: usize) -> usize {
        use rayon::prelude::*;
        (0..height)
            .into_par_iter()
            .map(|y| self.classify_row(y, None))
            .sum()
    }

    #[cfg(not(feature = "rayon"))]
    fn classify_rows(&self, height: usize) -> usize {
        (0..height).map(|y| self.classify_row(y, None)).sum()
    }

    fn classify_row(&self, y: usize, mut row: Option<&mut [bool]>) -> usize {
        let mut failed = 0;
        for x in 0..self.pyr_a.width() {
            let fail = !self.pixel_passes(x, y);
            if let Some(ref mut row) = row {
                row[x] = fail;
            }
            failed += usize::from(fail);
        }
        failed
    }

    fn pixel_passes(&self, x: usize, y: usize) -> bool {
        let (la, lb) = (self.pyr_a, self.pyr_b);

        let mut contrast = [0f32; BANDS];
        let mut sum_contrast = 0f32;
        for (i, c) in contrast.iter_mut().enumerate() {
            let n1 = (la.value(x, y, i) - la.value(x, y, i + 1)).abs();
            let n2 = (lb.value(x, y, i) - lb.value(x, y, i + 1)).abs();
            let numerator = n1.max(n2);
            let d1 = la.value(x, y, i + 2).abs();
            let d2 = lb.value(x, y, i + 2).abs();
            let denominator = d1.max(d2).max(MIN_LUMINANCE);
            *c = numerator / denominator;
            sum_contrast += *c;
        }
        let sum_contrast = sum_contrast.max(MIN_LUMINANCE);

        let level = self.bands.adaptation_level;
        let adapt = (0.5 * (la.value(x, y, level) + lb.value(x, y, level))).max(MIN_LUMINANCE);

        let mut factor = 0f32;
        for i in 0..BANDS {
            let f_mask = mask(contrast[i] * csf(self.bands.cpd[i], adapt));
            factor += contrast[i] * self.bands.f_freq[i] * f_mask / sum_contrast;
        }
        let factor = clamp(factor, MIN_FACTOR, MAX_FACTOR);

        let delta = (la.value(x, y, 0) - lb.value(x, y, 0)).abs();
        if delta > factor * tvi(adapt) {
            return false;
        }

        // CIE delta E, ramped down in scotopic regions
        let color_scale = if adapt < SCOTOPIC_LUMINANCE {
            let s = adapt / SCOTOPIC_LUMINANCE;
            s * s
        } else {
            1.0
        };
        let i = y * self.pyr_a.width() + x;
        let da = self.img_a.a[i] - self.img_b.a[i];
        let db = self.img_a.b[i] - self.img_b.b[i];
        let delta_e = da.mul_add(da, db * db) * color_scale;

        delta_e <= factor
    }
}
