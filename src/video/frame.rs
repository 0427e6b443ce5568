use crate::config::CropRange;
use crate::{Error, Result};

/// Bytes per RGB24 pixel.
pub(crate) const CHANNELS: usize = 3;

/// A decoded RGB24 video frame, stored row-major without padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl VisualFrame {
    /// Wraps a packed RGB24 buffer of `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * CHANNELS
        {
            return Err(Error::EmptyFrame);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a frame where every pixel has the same color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        Self::new(width, height, data)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB24 bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a view of rows `[crop.top, crop.bottom)` over the full width.
    pub fn crop(&self, crop: CropRange) -> Result<FrameView<'_>> {
        if crop.top >= crop.bottom || crop.bottom > self.height {
            return Err(Error::CropOutOfBounds {
                top: crop.top,
                bottom: crop.bottom,
                split_row: 0,
                split_col: 0,
                width: self.width,
                height: self.height,
            });
        }
        let stride = self.width as usize * CHANNELS;
        let data = &self.data[crop.top as usize * stride..crop.bottom as usize * stride];
        Ok(FrameView {
            width: self.width,
            height: crop.height(),
            data,
        })
    }

    /// Returns a view of the whole frame.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// A borrowed block of contiguous full-width rows of a [VisualFrame].
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    width: u32,
    height: u32,
    data: &'a [u8],
}

impl<'a> FrameView<'a> {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB24 bytes of the view, in row order.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the `[r, g, b]` value at `(x, y)`.
    #[inline(always)]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Iterates over the pixels of row `y`.
    pub fn row(&self, y: u32) -> impl Iterator<Item = [u8; 3]> + 'a {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        self.data[start..start + stride]
            .chunks_exact(CHANNELS)
            .map(|px| [px[0], px[1], px[2]])
    }
}

// Exposes the view to the block hash implementation. Alpha is always opaque.
impl<'a> blockhash::Image for FrameView<'a> {
    #[inline(always)]
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline(always)]
    fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let [r, g, b] = self.rgb(x, y);
        [r, g, b, 0xFF]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rejects_malformed_buffers() {
        assert!(matches!(
            VisualFrame::new(0, 2, vec![]),
            Err(Error::EmptyFrame)
        ));
        assert!(matches!(
            VisualFrame::new(2, 2, vec![0; 11]),
            Err(Error::EmptyFrame)
        ));
    }

    #[test]
    fn test_crop_keeps_full_rows() {
        // Row `y` is filled with the value `y`.
        let data: Vec<u8> = (0..4u8)
            .flat_map(|y| std::iter::repeat(y).take(2 * CHANNELS))
            .collect();
        let frame = VisualFrame::new(2, 4, data).unwrap();

        let view = frame.crop(CropRange { top: 1, bottom: 3 }).unwrap();
        assert_eq!(view.width(), 2);
        assert_eq!(view.height(), 2);
        assert_eq!(view.rgb(1, 0), [1, 1, 1]);
        assert_eq!(view.rgb(0, 1), [2, 2, 2]);
        assert_eq!(view.row(1).count(), 2);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let frame = VisualFrame::filled(4, 4, [0, 0, 0]).unwrap();
        assert!(matches!(
            frame.crop(CropRange { top: 2, bottom: 5 }),
            Err(Error::CropOutOfBounds { height: 4, .. })
        ));
        assert!(matches!(
            frame.crop(CropRange { top: 2, bottom: 2 }),
            Err(Error::CropOutOfBounds { .. })
        ));
    }
}
