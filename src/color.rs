mod consts {
    #![allow(clippy::unreadable_literal)]
    include!(concat!(env!("OUT_DIR"), "/adobe_rgb.rs"));
}

use crate::image::{unpremultiply, PixelBuffer};
use crate::{alloc_plane, PdiffError};

/// CIE L*a*b* junction point between the linear and cube-root segments.
const EPSILON: f32 = 216.0 / 24389.0;
const KAPPA: f32 = 24389.0 / 27.0;

/// An image in the opponent space the metric works in.
///
/// `luminance` is absolute luminance in cd/m², `a` and `b` are the
/// CIE L*a*b* red-green and blue-yellow coordinates.
#[derive(Debug, Clone)]
pub struct PerceptualImage {
    pub luminance: Vec<f32>,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    width: usize,
    height: usize,
}

impl PerceptualImage {
    /// Converts `buf`, decoding each channel with `gamma` and scaling the
    /// resulting relative luminance by the display's peak `luminance`.
    ///
    /// The source is assumed to be Adobe RGB (1998) with a D65 white point.
    ///
    /// # Errors
    /// - If the output planes cannot be allocated
    pub fn from_buffer(
        buf: &PixelBuffer<'_>,
        gamma: f32,
        luminance: f32,
    ) -> Result<Self, PdiffError> {
        let len = buf.len();
        let mut lum = alloc_plane(len)?;
        let mut a = alloc_plane(len)?;
        let mut b = alloc_plane(len)?;

        let to_linear: [f32; 256] = std::array::from_fn(|v| (v as f32 / 255.0).powf(gamma));

        let mut i = 0;
        for y in 0..buf.height() {
            for pixel in buf.row(y) {
                let [r, g, bl] = unpremultiply(pixel);
                let xyz = adobe_rgb_to_xyz([
                    to_linear[usize::from(r)],
                    to_linear[usize::from(g)],
                    to_linear[usize::from(bl)],
                ]);
                let [_, lab_a, lab_b] = xyz_to_lab(xyz);
                lum[i] = xyz[1] * luminance;
                a[i] = lab_a;
                b[i] = lab_b;
                i += 1;
            }
        }

        Ok(Self {
            luminance: lum,
            a,
            b,
            width: buf.width(),
            height: buf.height(),
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
}

#[inline]
fn adobe_rgb_to_xyz(rgb: [f32; 3]) -> [f32; 3] {
    let m = &consts::ADOBE_RGB_TO_XYZ;
    [
        rgb[0] * m[0] + rgb[1] * m[1] + rgb[2] * m[2],
        rgb[0] * m[3] + rgb[1] * m[4] + rgb[2] * m[5],
        rgb[0] * m[6] + rgb[1] * m[7] + rgb[2] * m[8],
    ]
}

#[inline]
fn xyz_to_lab(xyz: [f32; 3]) -> [f32; 3] {
    let f = |i: usize| {
        let r = xyz[i] / consts::REFERENCE_WHITE[i];
        if r > EPSILON {
            r.cbrt()
        } else {
            KAPPA.mul_add(r, 16.0) / 116.0
        }
    };
    let (fx, fy, fz) = (f(0), f(1), f(2));
    [
        116.0f32.mul_add(fy, -16.0),
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pixels: &[u32]) -> Vec<u8> {
        pixels.iter().flat_map(|p| p.to_ne_bytes()).collect()
    }

    #[test]
    fn white_maps_to_display_luminance() {
        let data = buffer(&[0xffff_ffff]);
        let buf = PixelBuffer::packed(&data, 1, 1).unwrap();
        let img = PerceptualImage::from_buffer(&buf, 2.2, 100.0).unwrap();
        assert!((img.luminance[0] - 100.0).abs() < 1e-3);
        assert!(img.a[0].abs() < 1e-3);
        assert!(img.b[0].abs() < 1e-3);
    }

    #[test]
    fn black_and_transparent_are_dark() {
        let data = buffer(&[0xff00_0000, 0x0000_0000]);
        let buf = PixelBuffer::packed(&data, 2, 1).unwrap();
        let img = PerceptualImage::from_buffer(&buf, 2.2, 100.0).unwrap();
        assert_eq!(img.luminance, vec![0.0, 0.0]);
        assert_eq!(img.a, vec![0.0, 0.0]);
    }

    #[test]
    fn greys_are_achromatic() {
        let pixels: Vec<u32> = (0..=255u32)
            .map(|v| 0xff00_0000 | (v << 16) | (v << 8) | v)
            .collect();
        let data = buffer(&pixels);
        let buf = PixelBuffer::packed(&data, 256, 1).unwrap();
        let img = PerceptualImage::from_buffer(&buf, 2.2, 80.0).unwrap();
        for i in 0..256 {
            assert!(img.a[i].abs() < 1e-2, "a[{i}] = {}", img.a[i]);
            assert!(img.b[i].abs() < 1e-2, "b[{i}] = {}", img.b[i]);
        }
        assert!(img.luminance.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn opponent_channels_have_expected_signs() {
        let data = buffer(&[0xffff_0000, 0xff00_ff00, 0xff00_00ff, 0xffff_ff00]);
        let buf = PixelBuffer::packed(&data, 4, 1).unwrap();
        let img = PerceptualImage::from_buffer(&buf, 2.2, 100.0).unwrap();
        // red is positive a, green negative a
        assert!(img.a[0] > 50.0);
        assert!(img.a[1] < -50.0);
        // blue is negative b, yellow positive b
        assert!(img.b[2] < -50.0);
        assert!(img.b[3] > 50.0);
        // green carries most of the luminance
        assert!(img.luminance[1] > img.luminance[0]);
        assert!(img.luminance[0] > img.luminance[2]);
    }

    #[test]
    fn higher_gamma_darkens_midtones() {
        let data = buffer(&[0xff80_8080]);
        let buf = PixelBuffer::packed(&data, 1, 1).unwrap();
        let low = PerceptualImage::from_buffer(&buf, 1.0, 100.0).unwrap();
        let high = PerceptualImage::from_buffer(&buf, 2.2, 100.0).unwrap();
        assert!(high.luminance[0] < low.luminance[0]);
        assert!((low.luminance[0] - 100.0 * 128.0 / 255.0).abs() < 1e-2);
    }

    #[test]
    fn reference_white_matches_matrix() {
        let white = adobe_rgb_to_xyz([1.0, 1.0, 1.0]);
        for i in 0..3 {
            assert!((white[i] - consts::REFERENCE_WHITE[i]).abs() < 1e-6);
        }
        let lab = xyz_to_lab(white);
        assert!((lab[0] - 100.0).abs() < 1e-3);
    }
}
