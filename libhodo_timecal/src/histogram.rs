//! Fixed binning histograms.
//!
//! Bins cover `[min, max)`; values below `min` go to the underflow counter and values at or
//! above `max` go to the overflow counter. Nothing ever reallocates after construction.
use ndarray::{Array2, Zip};
use serde::Serialize;

use super::error::HistogramError;

/// Where a value lands on an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Underflow,
    Bin(usize),
    Overflow,
}

/// A uniformly binned axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Axis {
    pub n_bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(n_bins: usize, min: f64, max: f64) -> Self {
        Self { n_bins, min, max }
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }

    pub fn find_slot(&self, value: f64) -> Slot {
        if value < self.min {
            Slot::Underflow
        } else if value >= self.max || value.is_nan() {
            Slot::Overflow
        } else {
            let idx = ((value - self.min) / self.bin_width()).floor() as usize;
            // Rounding can push a value just below max into the last+1 bin
            Slot::Bin(idx.min(self.n_bins - 1))
        }
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.bin_width()
    }
}

/// One dimensional histogram of counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram1D {
    axis: Axis,
    bins: Vec<u64>,
    underflow: u64,
    overflow: u64,
    entries: u64,
}

impl Histogram1D {
    pub fn new(n_bins: usize, min: f64, max: f64) -> Self {
        Self {
            axis: Axis::new(n_bins, min, max),
            bins: vec![0; n_bins],
            underflow: 0,
            overflow: 0,
            entries: 0,
        }
    }

    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1);
    }

    /// Add `weight` counts at `value`. Entries counts calls, not weight
    pub fn fill_weighted(&mut self, value: f64, weight: u64) {
        self.entries += 1;
        match self.axis.find_slot(value) {
            Slot::Underflow => self.underflow += weight,
            Slot::Overflow => self.overflow += weight,
            Slot::Bin(idx) => self.bins[idx] += weight,
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn counts(&self) -> &[u64] {
        &self.bins
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of the in-range bins
    pub fn integral(&self) -> u64 {
        self.bins.iter().sum()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.axis.bin_center(bin)
    }

    /// Index of the most populated in-range bin, first one on ties.
    /// None when no in-range bin has any counts
    pub fn maximum_bin(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (idx, count) in self.bins.iter().enumerate() {
            match best {
                Some((_, c)) if *count <= c => (),
                _ if *count == 0 => (),
                _ => best = Some((idx, *count)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Center of the most populated bin
    pub fn mode_bin_center(&self) -> Option<f64> {
        self.maximum_bin().map(|bin| self.bin_center(bin))
    }

    /// Mean of the in-range contents using bin centers
    pub fn mean(&self) -> Option<f64> {
        let total = self.integral();
        if total == 0 {
            return None;
        }
        let sum: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(idx, count)| self.bin_center(idx) * *count as f64)
            .sum();
        Some(sum / total as f64)
    }

    /// Add another histogram with identical binning into this one
    pub fn merge(&mut self, other: &Histogram1D) -> Result<(), HistogramError> {
        if self.axis != other.axis {
            return Err(HistogramError::BinningMismatch(format!(
                "{:?} vs {:?}",
                self.axis, other.axis
            )));
        }
        for (mine, theirs) in self.bins.iter_mut().zip(other.bins.iter()) {
            *mine += *theirs;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }
}

/// Two dimensional histogram of counts. Out of range fills only bump `out_of_range`.
/// Bin counts saturate at `u32::MAX`
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x_axis: Axis,
    y_axis: Axis,
    bins: Array2<u32>,
    out_of_range: u64,
    entries: u64,
}

impl Histogram2D {
    pub fn new(x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            x_axis,
            y_axis,
            bins: Array2::zeros((x_axis.n_bins, y_axis.n_bins)),
            out_of_range: 0,
            entries: 0,
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x_axis.find_slot(x), self.y_axis.find_slot(y)) {
            (Slot::Bin(ix), Slot::Bin(iy)) => {
                let bin = &mut self.bins[[ix, iy]];
                *bin = bin.saturating_add(1);
            }
            _ => self.out_of_range += 1,
        }
    }

    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    pub fn counts(&self) -> &Array2<u32> {
        &self.bins
    }

    pub fn get(&self, x_bin: usize, y_bin: usize) -> u32 {
        self.bins[[x_bin, y_bin]]
    }

    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn merge(&mut self, other: &Histogram2D) -> Result<(), HistogramError> {
        if self.x_axis != other.x_axis || self.y_axis != other.y_axis {
            return Err(HistogramError::BinningMismatch(format!(
                "{:?}x{:?} vs {:?}x{:?}",
                self.x_axis, self.y_axis, other.x_axis, other.y_axis
            )));
        }
        Zip::from(&mut self.bins)
            .and(&other.bins)
            .for_each(|a, b| *a = a.saturating_add(*b));
        self.out_of_range += other.out_of_range;
        self.entries += other.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_mode() {
        let mut hist = Histogram1D::new(150, 500.0, 650.0);
        hist.fill(573.0);
        assert_eq!(hist.maximum_bin(), Some(73));
        assert_eq!(hist.mode_bin_center(), Some(573.5));
    }

    #[test]
    fn test_edges() {
        let mut hist = Histogram1D::new(150, 500.0, 650.0);
        hist.fill(499.0);
        hist.fill(500.0);
        hist.fill(649.0);
        hist.fill(650.0);
        assert_eq!(hist.underflow(), 1);
        assert_eq!(hist.overflow(), 1);
        assert_eq!(hist.counts()[0], 1);
        assert_eq!(hist.counts()[149], 1);
        assert_eq!(hist.entries(), 4);
        assert_eq!(hist.integral(), 2);
    }

    #[test]
    fn test_mode_ties_pick_first() {
        let mut hist = Histogram1D::new(10, 0.0, 10.0);
        hist.fill(7.2);
        hist.fill(3.1);
        assert_eq!(hist.maximum_bin(), Some(3));
    }

    #[test]
    fn test_empty_has_no_mode() {
        let mut hist = Histogram1D::new(10, 0.0, 10.0);
        hist.fill(-1.0);
        assert_eq!(hist.mode_bin_center(), None);
        assert_eq!(hist.mean(), None);
    }

    #[test]
    fn test_weighted_fill() {
        let mut hist = Histogram1D::new(96, 0.0, 96.0);
        hist.fill_weighted(12.0, 3);
        assert_eq!(hist.counts()[12], 3);
        assert_eq!(hist.entries(), 1);
    }

    #[test]
    fn test_merge() {
        let mut a = Histogram1D::new(10, 0.0, 10.0);
        let mut b = Histogram1D::new(10, 0.0, 10.0);
        a.fill(1.5);
        b.fill(1.5);
        b.fill(20.0);
        a.merge(&b).unwrap();
        assert_eq!(a.counts()[1], 2);
        assert_eq!(a.overflow(), 1);
        assert_eq!(a.entries(), 3);

        let c = Histogram1D::new(5, 0.0, 10.0);
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn test_2d_fill_and_merge() {
        let mut a = Histogram2D::new(Axis::new(96, 0.0, 96.0), Axis::new(10, 0.0, 10.0));
        a.fill(70.0, 2.0);
        a.fill(70.0, 12.0);
        let b = a.clone();
        a.merge(&b).unwrap();
        assert_eq!(a.get(70, 2), 2);
        assert_eq!(a.out_of_range(), 2);
        assert_eq!(a.entries(), 4);
    }

    #[test]
    fn test_2d_counts_saturate() {
        let mut a = Histogram2D::new(Axis::new(96, 0.0, 96.0), Axis::new(10, 0.0, 10.0));
        a.bins[[3, 0]] = u32::MAX - 1;
        a.fill(3.0, 0.0);
        a.fill(3.0, 0.0);
        assert_eq!(a.get(3, 0), u32::MAX);

        let mut b = Histogram2D::new(Axis::new(96, 0.0, 96.0), Axis::new(10, 0.0, 10.0));
        b.fill(3.0, 0.0);
        b.merge(&a).unwrap();
        assert_eq!(b.get(3, 0), u32::MAX);
        assert_eq!(b.entries(), 3);
    }
}
