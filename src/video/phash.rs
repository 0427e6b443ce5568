//! Perceptual frame hashing.
//!
//! A perceptual hash maps an image to a fixed-length [BitHash] so that perceptually
//! similar images end up a small Hamming distance apart. The extractor only relies on
//! the [FrameHasher] trait; which algorithm runs is a matter of configuration.

use std::f64::consts::PI;

use image::imageops::FilterType;

use crate::config::{HashAlgorithm, PhashConfig};
use crate::hash::BitHash;
use crate::{Error, Result};

use super::frame::FrameView;

/// Computes a fixed-length binary fingerprint of a frame region.
pub trait FrameHasher: Send + Sync {
    /// Number of bits in every hash produced by this hasher.
    fn bits(&self) -> usize;

    fn hash(&self, view: &FrameView<'_>) -> Result<BitHash>;
}

/// Returns the hasher selected by the configuration.
pub fn build_hasher(algorithm: HashAlgorithm, phash: PhashConfig) -> Box<dyn FrameHasher> {
    match algorithm {
        HashAlgorithm::Dct => Box::new(DctHasher::new(phash)),
        HashAlgorithm::Block => Box::new(BlockHasher),
    }
}

// 8-bit grayscale conversion with ITU-R 601-2 weights in 16-bit fixed point, as most
// image libraries implement their "L" mode.
#[inline(always)]
fn to_gray([r, g, b]: [u8; 3]) -> u8 {
    ((u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16) as u8
}

/// DCT-based perceptual hash.
///
/// The frame is converted to grayscale and downscaled to `N x N` pixels, with
/// `N = hash_size * high_freq_factor`. A 2D DCT-II is applied and the lowest
/// `hash_size x hash_size` frequencies are kept. Each bit records whether a coefficient
/// is above the median of the kept coefficients.
#[derive(Clone, Debug)]
pub struct DctHasher {
    hash_size: usize,
    image_size: usize,
    // Row `k` holds the DCT-II basis function for frequency `k`, sampled at `image_size`
    // points.
    basis: Vec<Vec<f64>>,
}

impl DctHasher {
    pub fn new(config: PhashConfig) -> Self {
        let hash_size = config.hash_size as usize;
        let image_size = hash_size * config.high_freq_factor as usize;
        let n = image_size as f64;
        let basis = (0..hash_size)
            .map(|k| {
                (0..image_size)
                    .map(|i| (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                    .collect()
            })
            .collect();
        Self {
            hash_size,
            image_size,
            basis,
        }
    }

    // Downscales the view to a square grayscale image, returned row-major.
    fn downscale(&self, view: &FrameView<'_>) -> Result<Vec<f64>> {
        let gray: Vec<u8> = (0..view.height()).flat_map(|y| view.row(y)).map(to_gray).collect();
        let img = image::GrayImage::from_raw(view.width(), view.height(), gray)
            .ok_or(Error::EmptyFrame)?;
        let size = self.image_size as u32;
        let small = image::imageops::resize(&img, size, size, FilterType::Lanczos3);
        Ok(small.into_raw().into_iter().map(f64::from).collect())
    }

    // Low-frequency block of the 2D DCT-II: `C * X * C^T`, with `C` the truncated basis.
    fn low_frequencies(&self, pixels: &[f64]) -> Vec<f64> {
        let (k, n) = (self.hash_size, self.image_size);

        // Transform along columns: `t[u][x] = sum_y C[u][y] * X[y][x]`.
        let mut t = vec![0f64; k * n];
        for u in 0..k {
            for y in 0..n {
                let c = self.basis[u][y];
                let row = &pixels[y * n..(y + 1) * n];
                for (acc, p) in t[u * n..(u + 1) * n].iter_mut().zip(row) {
                    *acc += c * p;
                }
            }
        }

        // Then along rows: `out[u][v] = sum_x t[u][x] * C[v][x]`.
        let mut out = vec![0f64; k * k];
        for u in 0..k {
            let row = &t[u * n..(u + 1) * n];
            for v in 0..k {
                out[u * k + v] = row
                    .iter()
                    .zip(&self.basis[v])
                    .map(|(a, b)| a * b)
                    .sum();
            }
        }
        out
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl FrameHasher for DctHasher {
    fn bits(&self) -> usize {
        self.hash_size * self.hash_size
    }

    fn hash(&self, view: &FrameView<'_>) -> Result<BitHash> {
        let pixels = self.downscale(view)?;
        let coefficients = self.low_frequencies(&pixels);
        let med = median(&coefficients);
        Ok(BitHash::from_bits(coefficients.iter().map(|c| *c > med)))
    }
}

/// 144-bit block mean hash.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockHasher;

impl FrameHasher for BlockHasher {
    fn bits(&self) -> usize {
        144
    }

    fn hash(&self, view: &FrameView<'_>) -> Result<BitHash> {
        // Blockhash144 displays as 36 hex digits.
        blockhash::blockhash144(view).to_string().parse()
    }
}
