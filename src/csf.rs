//! Psychophysical models used by the comparator.

use crate::pyramid::MAX_PYR_LEVELS;

/// Number of band-pass contrast bands (each needs two coarser levels).
pub(crate) const BANDS: usize = MAX_PYR_LEVELS - 2;

/// Peak of the contrast sensitivity function at 100 cd/m², in cycles per
/// degree.
const CSF_PEAK_CPD: f32 = 3.248;
const CSF_REFERENCE_LUMINANCE: f32 = 100.0;

/// Threshold versus intensity: the smallest visible luminance change (cd/m²)
/// at the given adaptation luminance.
///
/// Piecewise fit from Ward Larson et al., SIGGRAPH 1997.
#[must_use]
pub(crate) fn tvi(adaptation_luminance: f32) -> f32 {
    let log_a = adaptation_luminance.log10();

    let r = if log_a < -3.94 {
        -2.86
    } else if log_a < -1.44 {
        0.405f32.mul_add(log_a, 1.6).powf(2.18) - 2.86
    } else if log_a < -0.0184 {
        log_a - 0.395
    } else if log_a < 1.9 {
        0.249f32.mul_add(log_a, 0.65).powf(2.7) - 0.72
    } else {
        log_a - 1.255
    };

    10f32.powf(r)
}

/// Contrast sensitivity at `cpd` cycles per degree for a viewer adapted to
/// `lum` cd/m² (Barten, SPIE 1989).
#[must_use]
pub(crate) fn csf(cpd: f32, lum: f32) -> f32 {
    let a = 440.0 * (1.0 + 0.7 / lum).powf(-0.2);
    let b = 0.3 * (1.0 + 100.0 / lum).powf(0.15);

    // exp(-bc) * sqrt(1 + 0.06 exp(bc)), folded so large bc decays to zero
    // instead of multiplying an underflow by an overflow
    let decay = (-b * cpd).exp();
    a * cpd * 0.06f32.mul_add(decay, decay * decay).sqrt()
}

/// Visual masking (Daly 1993): how much a band's own contrast raises its
/// detection threshold.
#[must_use]
pub(crate) fn mask(contrast: f32) -> f32 {
    let a = (392.498 * contrast).powf(0.7);
    let b = (0.0153 * a).powf(4.0);
    (1.0 + b).powf(0.25)
}

/// Viewing geometry shared by every pixel of one comparison.
#[derive(Debug, Clone)]
pub(crate) struct SpatialBands {
    /// Pyramid level whose blur radius roughly covers one degree of view.
    pub adaptation_level: usize,
    /// Center frequency of each pyramid level, in cycles per degree.
    pub cpd: [f32; MAX_PYR_LEVELS],
    /// Inverse sensitivity of each band relative to the CSF peak.
    pub f_freq: [f32; BANDS],
}

impl SpatialBands {
    /// `field_of_view` is the horizontal angle, in degrees, the image spans.
    #[must_use]
    pub fn new(width: usize, field_of_view: f32) -> Self {
        let one_degree_pixels =
            (2.0 * (f64::from(field_of_view) * 0.5).to_radians().tan()).to_degrees() as f32;
        let pixels_per_degree = width as f32 / one_degree_pixels;

        let mut num_pixels = 1.0f32;
        let mut adaptation_level = 0;
        for level in 0..MAX_PYR_LEVELS {
            adaptation_level = level;
            if num_pixels > one_degree_pixels {
                break;
            }
            num_pixels *= 2.0;
        }

        let mut cpd = [0f32; MAX_PYR_LEVELS];
        cpd[0] = 0.5 * pixels_per_degree;
        for i in 1..MAX_PYR_LEVELS {
            cpd[i] = 0.5 * cpd[i - 1];
        }

        let csf_max = csf(CSF_PEAK_CPD, CSF_REFERENCE_LUMINANCE);
        let mut f_freq = [0f32; BANDS];
        for (f, &c) in f_freq.iter_mut().zip(cpd.iter()) {
            // saturates for bands far above the visible range
            *f = (csf_max / csf(c, CSF_REFERENCE_LUMINANCE)).min(f32::MAX);
        }

        Self {
            adaptation_level,
            cpd,
            f_freq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tvi_grows_with_adaptation() {
        let levels = [1e-5f32, 1e-3, 0.01, 0.5, 1.0, 10.0, 100.0, 1000.0];
        for pair in levels.windows(2) {
            assert!(tvi(pair[0]) <= tvi(pair[1]), "{pair:?}");
        }
        // photopic range is Weber-like: ~5.6% of the adaptation level
        assert!((tvi(1000.0) / 1000.0 - 10f32.powf(-1.255)).abs() < 1e-4);
        // scotopic floor
        assert!((tvi(1e-6) - 10f32.powf(-2.86)).abs() < 1e-6);
    }

    #[test]
    fn csf_peaks_near_three_cycles() {
        let peak = csf(CSF_PEAK_CPD, 100.0);
        for cpd in [0.5f32, 1.0, 2.0, 6.0, 10.0, 30.0] {
            assert!(csf(cpd, 100.0) < peak, "csf({cpd}) >= peak");
        }
        assert!(csf(0.0, 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn csf_drops_in_the_dark() {
        assert!(csf(3.0, 0.1) < csf(3.0, 100.0));
    }

    #[test]
    fn csf_vanishes_at_extreme_frequencies() {
        for lum in [1e-5f32, 0.1, 100.0] {
            for cpd in [50.0f32, 120.0, 350.0, 1e4] {
                let s = csf(cpd, lum);
                assert!(s.is_finite() && s >= 0.0, "csf({cpd}, {lum}) = {s}");
            }
        }
        assert!(csf(1e4, 1e-5) < 1e-30);
    }

    #[test]
    fn narrow_field_weights_stay_finite() {
        let bands = SpatialBands::new(1400, 2.0);
        assert!(bands.cpd[0] > 300.0);
        assert!(bands.f_freq.iter().all(|f| f.is_finite() && *f > 0.0));
    }

    #[test]
    fn mask_is_one_without_contrast() {
        assert!((mask(0.0) - 1.0).abs() < f32::EPSILON);
        assert!(mask(0.01) < mask(1.0));
        assert!(mask(1.0) < mask(100.0));
    }

    #[test]
    fn bands_halve_per_level() {
        let bands = SpatialBands::new(1024, 45.0);
        for i in 1..MAX_PYR_LEVELS {
            assert!((bands.cpd[i] * 2.0 - bands.cpd[i - 1]).abs() < 1e-4);
        }
        // 45 degrees span ~47.5 "one degree" pixels, so 64 is the first
        // power of two past it
        assert_eq!(bands.adaptation_level, 6);
        assert!(bands.f_freq.iter().all(|f| f.is_finite() && *f > 0.0));
    }

    #[test]
    fn adaptation_level_saturates() {
        let bands = SpatialBands::new(64, 170.0);
        assert_eq!(bands.adaptation_level, MAX_PYR_LEVELS - 1);
        let narrow = SpatialBands::new(64, 0.5);
        assert_eq!(narrow.adaptation_level, 0);
    }
}
