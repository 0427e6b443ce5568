//! Perceived luminance per frame quadrant.
//!
//! Luminance follows the HSP color model: `sqrt(0.299 R^2 + 0.587 G^2 + 0.114 B^2)`.
//! See: http://alienryderflex.com/hsp.html

use crate::config::{QuadrantSplit, Rounding};
use crate::{Error, Result};

use super::frame::FrameView;

const WEIGHT_R: f64 = 0.299;
const WEIGHT_G: f64 = 0.587;
const WEIGHT_B: f64 = 0.114;

/// Perceived luminance of a single pixel, in `[0, 255]`.
#[inline(always)]
pub fn perceived_luminance([r, g, b]: [u8; 3]) -> f64 {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    (WEIGHT_R * r * r + WEIGHT_G * g * g + WEIGHT_B * b * b).sqrt()
}

/// Rounded mean luminance of each quadrant of a frame.
///
/// The derived values are computed from the rounded quadrant means, not from the raw
/// luminance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadrantFeatures {
    pub upper_left: i32,
    pub upper_right: i32,
    pub lower_left: i32,
    pub lower_right: i32,
}

impl QuadrantFeatures {
    pub fn new(upper_left: i32, upper_right: i32, lower_left: i32, lower_right: i32) -> Self {
        Self {
            upper_left,
            upper_right,
            lower_left,
            lower_right,
        }
    }

    /// Arithmetic mean of the four quadrant means.
    pub fn mean(&self) -> f64 {
        f64::from(self.upper_left + self.upper_right + self.lower_left + self.lower_right) / 4.0
    }

    /// Top half minus bottom half.
    pub fn vertical_diff(&self) -> i32 {
        (self.upper_left + self.upper_right) - (self.lower_left + self.lower_right)
    }

    /// Left half minus right half.
    pub fn horizontal_diff(&self) -> i32 {
        (self.upper_left + self.lower_left) - (self.upper_right + self.lower_right)
    }

    /// Computes the quadrant means of `view`, split at `split`.
    pub fn from_view(view: &FrameView<'_>, split: QuadrantSplit, rounding: Rounding) -> Result<Self> {
        let (width, height) = (view.width(), view.height());
        if split.row == 0 || split.row >= height || split.col == 0 || split.col >= width {
            return Err(Error::CropOutOfBounds {
                top: 0,
                bottom: height,
                split_row: split.row,
                split_col: split.col,
                width,
                height,
            });
        }

        // Indexed as `2 * lower + right`.
        let mut sums = [0f64; 4];
        for y in 0..height {
            let lower = usize::from(y >= split.row);
            let mut row_sums = [0f64; 2];
            for (x, px) in view.row(y).enumerate() {
                row_sums[usize::from(x as u32 >= split.col)] += perceived_luminance(px);
            }
            sums[2 * lower] += row_sums[0];
            sums[2 * lower + 1] += row_sums[1];
        }

        let (top, bottom) = (f64::from(split.row), f64::from(height - split.row));
        let (left, right) = (f64::from(split.col), f64::from(width - split.col));
        let areas = [top * left, top * right, bottom * left, bottom * right];

        let mut means = [0i32; 4];
        for ((mean, sum), area) in means.iter_mut().zip(sums).zip(areas) {
            *mean = rounding.apply(sum / area) as i32;
        }

        Ok(Self::new(means[0], means[1], means[2], means[3]))
    }
}
