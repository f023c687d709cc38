use crate::PdiffError;

/// Borrowed view of a packed 32-bit pixel image.
///
/// Each pixel is a native-endian `u32` holding premultiplied ARGB, with
/// alpha in the top byte and blue in the bottom byte (the layout used by
/// cairo's `ARGB32` surfaces). Rows start `stride` bytes apart; any bytes
/// between `width * 4` and `stride` are padding and never read.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> PixelBuffer<'a> {
    /// Wraps `data` as a `width` x `height` image with the given row stride
    /// in bytes.
    ///
    /// # Errors
    /// - If `stride` is smaller than `width * 4`
    /// - If `data` is too short to hold `height` rows
    /// - If the byte size overflows `usize`
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, PdiffError> {
        let too_large = PdiffError::ImageTooLarge { width, height };
        let row_bytes = width.checked_mul(4).ok_or_else(|| too_large.clone())?;
        if stride < row_bytes {
            return Err(PdiffError::InvalidStride { width, stride });
        }

        if height > 0 {
            let expected = stride
                .checked_mul(height - 1)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or(too_large)?;
            if data.len() < expected {
                return Err(PdiffError::BufferTooSmall {
                    expected,
                    actual: data.len(),
                });
            }
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Wraps tightly packed rows (`stride == width * 4`).
    ///
    /// # Errors
    /// See [`new`][Self::new].
    pub fn packed(data: &'a [u8], width: usize, height: usize) -> Result<Self, PdiffError> {
        let stride = width
            .checked_mul(4)
            .ok_or(PdiffError::ImageTooLarge { width, height })?;
        Self::new(data, width, height, stride)
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Bytes between the starts of consecutive rows.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Number of pixels, without padding.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The packed pixels of row `y`.
    ///
    /// # Panics
    /// - If `y >= height`
    pub fn row(&self, y: usize) -> impl Iterator<Item = u32> + 'a {
        assert!(y < self.height);
        let data = self.data;
        let start = y * self.stride;
        data[start..start + self.width * 4]
            .chunks_exact(4)
            .map(|px| u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// The packed pixel at `(x, y)`.
    ///
    /// # Panics
    /// - If `(x, y)` lies outside the image
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        assert!(x < self.width && y < self.height);
        let i = y * self.stride + x * 4;
        u32::from_ne_bytes([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }
}

/// Splits a premultiplied ARGB pixel into straight (un-premultiplied) RGB.
///
/// Fully transparent pixels are black. Channels larger than alpha, which a
/// valid premultiplied pixel never has, saturate at 255.
#[inline]
#[must_use]
pub fn unpremultiply(pixel: u32) -> [u8; 3] {
    let alpha = pixel >> 24;
    if alpha == 0 {
        return [0; 3];
    }
    let channel = |shift: u32| {
        let c = (pixel >> shift) & 0xff;
        ((c * 255 + alpha / 2) / alpha).min(255) as u8
    };
    [channel(16), channel(8), channel(0)]
}
