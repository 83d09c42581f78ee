//! Non-uniform 1-D cell spacing along one grid axis.

use crate::checkpoint_error::CheckpointError;
use serde::{Deserialize, Serialize};

/// Cell widths along one axis, starting at `start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshMap {
    start: f64,
    widths: Vec<f64>,
}

impl MeshMap {
    /// Explicit cell widths; every width must be finite and positive.
    pub fn from_widths(start: f64, widths: Vec<f64>) -> Result<Self, CheckpointError> {
        if !start.is_finite() {
            return Err(CheckpointError::Mesh(format!("start {start} is not finite")));
        }
        if let Some((i, w)) = widths
            .iter()
            .enumerate()
            .find(|&(_, w)| !(w.is_finite() && *w > 0.0))
        {
            return Err(CheckpointError::Mesh(format!(
                "cell {i} has non-positive width {w}"
            )));
        }
        Ok(Self { start, widths })
    }

    /// `ncells` equal cells covering `[start, end]`.
    pub fn uniform(start: f64, end: f64, ncells: usize) -> Result<Self, CheckpointError> {
        check_interval(start, end)?;
        let h = (end - start) / ncells as f64;
        Self::from_widths(start, vec![h; ncells])
    }

    /// `ncells` cells covering `[start, end]` whose widths grow geometrically
    /// by `ratio` from one cell to the next (`ratio < 1` shrinks them).
    pub fn stretched(
        start: f64,
        end: f64,
        ncells: usize,
        ratio: f64,
    ) -> Result<Self, CheckpointError> {
        check_interval(start, end)?;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(CheckpointError::Mesh(format!("stretch ratio {ratio} must be positive")));
        }
        if (ratio - 1.0).abs() < f64::EPSILON {
            return Self::uniform(start, end, ncells);
        }
        let n = ncells as i32;
        let first = (end - start) * (ratio - 1.0) / (ratio.powi(n) - 1.0);
        let widths = (0..n).map(|i| first * ratio.powi(i)).collect();
        Self::from_widths(start, widths)
    }

    #[inline]
    pub fn ncells(&self) -> usize {
        self.widths.len()
    }

    #[inline]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Width of cell `i`. Panics when `i >= ncells()`.
    #[inline]
    pub fn cell_width(&self, i: usize) -> f64 {
        self.widths[i]
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    /// Cell-boundary positions: `ncells() + 1` values, `v[0] = start` and
    /// `v[i] = v[i-1] + width(i-1)`.
    pub fn vertices(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.widths.len() + 1);
        let mut x = self.start;
        v.push(x);
        for &w in &self.widths {
            x += w;
            v.push(x);
        }
        v
    }
}

fn check_interval(start: f64, end: f64) -> Result<(), CheckpointError> {
    if !(start.is_finite() && end.is_finite() && end > start) {
        return Err(CheckpointError::Mesh(format!(
            "interval [{start}, {end}] is empty or not finite"
        )));
    }
    Ok(())
}
