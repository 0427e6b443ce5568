use crate::{Error, Result};

/// A fixed-step sampling grid over a stream of known duration.
///
/// The grid holds `floor(duration / step) + 1` timestamps, starting at `0.0`. Each
/// timestamp is computed from its integer index (`i * step`) rather than by repeated
/// addition, so long grids do not accumulate floating point drift.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeGrid {
    duration: f64,
    step: f64,
    len: usize,
}

impl TimeGrid {
    /// Constructs a grid covering `[0, duration]` with the given `step` (both in seconds).
    pub fn new(duration: f64, step: f64) -> Result<Self> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "stream duration must be a non-negative number, got {}",
                duration
            )));
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "grid step must be a positive number, got {}",
                step
            )));
        }

        let too_long = || {
            Error::InvalidParameter(format!(
                "a grid over {}s with a step of {}s has too many points",
                duration, step
            ))
        };
        let steps = (duration / step).floor();
        // Anything at or above 2^64 saturates on conversion.
        if steps >= usize::MAX as f64 {
            return Err(too_long());
        }
        let mut len = (steps as usize).checked_add(1).ok_or_else(too_long)?;

        // The division is off by at most one step; settle on the last index with
        // `i * step <= duration`.
        for _ in 0..2 {
            if len > 1 && (len - 1) as f64 * step > duration {
                len -= 1;
            }
        }
        for _ in 0..2 {
            if len as f64 * step <= duration {
                len = len.checked_add(1).ok_or_else(too_long)?;
            }
        }

        Ok(Self {
            duration,
            step,
            len,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of timestamps in the grid. Never zero.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the `i`-th timestamp, or `None` past the end of the grid.
    #[inline]
    pub fn at(&self, i: usize) -> Option<f64> {
        (i < self.len).then(|| i as f64 * self.step)
    }

    /// Returns an iterator over all timestamps. The grid can be iterated any
    /// number of times and always yields the same sequence.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        (0..self.len).map(move |i| i as f64 * self.step)
    }

    /// Returns the timestamps as a `Vec`.
    pub fn timestamps(&self) -> Vec<f64> {
        self.iter().collect()
    }
}
