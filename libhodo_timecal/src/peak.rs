//! Peak time extraction.
//!
//! Cosmic-ray timing distributions are not Gaussian, so the default estimator takes the
//! center of the most populated bin. [`GaussianEstimator`] is the estimator meant for beam
//! data; both sit behind the [`PeakEstimator`] trait so the choice is a configuration switch.
use bit_set::BitSet;
use ndarray::Array3;
use serde::Serialize;

use super::channel_entry::ChannelEntry;
use super::channel_map::ChannelMap;
use super::config::{CalibrationConstants, PeakEstimatorKind};
use super::constants::{CHANNEL_UNCERTAINTY, NO_DATA_MARKER};
use super::histogram::Histogram1D;
use super::time_store::TimeDistributionStore;

/// A peak time and its uncertainty, in converted time units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakEstimate {
    pub time: f64,
    pub uncertainty: f64,
}

/// Strategy turning a time distribution into a single representative time
pub trait PeakEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// None when the histogram has nothing inside the window
    fn estimate(&self, histogram: &Histogram1D) -> Option<PeakEstimate>;
}

/// Center of the most populated bin with a fixed uncertainty
#[derive(Debug, Clone)]
pub struct ModeEstimator {
    pub uncertainty: f64,
}

impl PeakEstimator for ModeEstimator {
    fn name(&self) -> &'static str {
        "mode"
    }

    fn estimate(&self, histogram: &Histogram1D) -> Option<PeakEstimate> {
        histogram.mode_bin_center().map(|time| PeakEstimate {
            time,
            uncertainty: self.uncertainty,
        })
    }
}

/// Mean and error on the mean of the bins within `window_bins` of the mode.
///
/// Falls back to `fallback_uncertainty` when the spread cannot be measured (one entry, or
/// all entries in one bin).
#[derive(Debug, Clone)]
pub struct GaussianEstimator {
    pub window_bins: usize,
    pub fallback_uncertainty: f64,
}

impl PeakEstimator for GaussianEstimator {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn estimate(&self, histogram: &Histogram1D) -> Option<PeakEstimate> {
        let mode = histogram.maximum_bin()?;
        let counts = histogram.counts();
        let first = mode.saturating_sub(self.window_bins);
        let last = (mode + self.window_bins).min(counts.len() - 1);

        let mut n = 0.0;
        let mut sum = 0.0;
        for bin in first..=last {
            let c = counts[bin] as f64;
            n += c;
            sum += c * histogram.bin_center(bin);
        }
        let mean = sum / n;
        let variance = (first..=last)
            .map(|bin| counts[bin] as f64 * (histogram.bin_center(bin) - mean).powi(2))
            .sum::<f64>()
            / n;

        let uncertainty = if n > 1.0 && variance > 0.0 {
            (variance / n).sqrt()
        } else {
            self.fallback_uncertainty
        };
        Some(PeakEstimate {
            time: mean,
            uncertainty,
        })
    }
}

/// Build the estimator selected in the configuration
pub fn make_estimator(constants: &CalibrationConstants) -> Box<dyn PeakEstimator> {
    let uncertainty = constants.peak_uncertainty * constants.tick_conversion;
    match constants.peak_estimator {
        PeakEstimatorKind::Mode => Box::new(ModeEstimator { uncertainty }),
        PeakEstimatorKind::Gaussian { window_bins } => Box::new(GaussianEstimator {
            window_bins,
            fallback_uncertainty: uncertainty,
        }),
    }
}

/// Peak of one (trigger, board, channel)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Peak {
    /// Time with its error, and the channel as x with its error
    Measured {
        time: f64,
        time_error: f64,
        x: f64,
        x_error: f64,
    },
    /// Channel is eligible but its histogram is empty in the window
    Empty,
    /// Channel is outside the timing policy
    NotEligible,
}

impl Peak {
    pub fn time(&self) -> Option<f64> {
        match self {
            Peak::Measured { time, .. } => Some(*time),
            _ => None,
        }
    }

    /// (x, y, ex, ey) for plotting, with the no-data marker in place of missing values
    pub fn graph_point(&self) -> (f64, f64, f64, f64) {
        match self {
            Peak::Measured {
                time,
                time_error,
                x,
                x_error,
            } => (*x, *time, *x_error, *time_error),
            _ => (NO_DATA_MARKER, NO_DATA_MARKER, NO_DATA_MARKER, NO_DATA_MARKER),
        }
    }
}

/// Peak time vs channel for one (trigger, board), in the shape a graph with errors wants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakGraph {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub ex: Vec<f64>,
    pub ey: Vec<f64>,
}

/// Peaks of every (trigger, board, channel)
#[derive(Debug, Clone, PartialEq)]
pub struct PeakTable {
    peaks: Array3<Peak>,
}

impl PeakTable {
    pub fn get(&self, trigger: usize, board: usize, channel: usize) -> &Peak {
        &self.peaks[[trigger, board, channel]]
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.peaks.dim()
    }

    pub fn graph(&self, trigger: usize, board: usize) -> PeakGraph {
        let (_, _, n_channels) = self.peaks.dim();
        let mut graph = PeakGraph {
            x: Vec::with_capacity(n_channels),
            y: Vec::with_capacity(n_channels),
            ex: Vec::with_capacity(n_channels),
            ey: Vec::with_capacity(n_channels),
        };
        for channel in 0..n_channels {
            let (x, y, ex, ey) = self.peaks[[trigger, board, channel]].graph_point();
            graph.x.push(x);
            graph.y.push(y);
            graph.ex.push(ex);
            graph.ey.push(ey);
        }
        graph
    }

    /// Number of measured peaks for a trigger
    pub fn n_measured(&self, trigger: usize) -> usize {
        self.peaks
            .index_axis(ndarray::Axis(0), trigger)
            .iter()
            .filter(|p| matches!(p, Peak::Measured { .. }))
            .count()
    }
}

/// PeakExtractor applies the timing policy and the estimator to a filled store
pub struct PeakExtractor {
    estimator: Box<dyn PeakEstimator>,
    eligible_triggers: BitSet,
    eligible_boards: usize,
}

impl std::fmt::Debug for PeakExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeakExtractor")
            .field("estimator", &self.estimator.name())
            .field("eligible_triggers", &self.eligible_triggers)
            .field("eligible_boards", &self.eligible_boards)
            .finish()
    }
}

impl PeakExtractor {
    pub fn new(constants: &CalibrationConstants) -> Self {
        Self::with_estimator(constants, make_estimator(constants))
    }

    pub fn with_estimator(
        constants: &CalibrationConstants,
        estimator: Box<dyn PeakEstimator>,
    ) -> Self {
        Self {
            estimator,
            eligible_triggers: constants.eligible_triggers.iter().copied().collect(),
            eligible_boards: constants.eligible_boards,
        }
    }

    /// Timing policy: hodoscope channels on the eligible boards, for the cosmic self-triggers
    pub fn is_eligible(&self, trigger: usize, board: usize, entry: &ChannelEntry) -> bool {
        board < self.eligible_boards
            && entry.is_hodoscope()
            && self.eligible_triggers.contains(trigger)
    }

    /// Compute the peak of every channel. The store must be fully merged
    pub fn extract(&self, store: &TimeDistributionStore, channel_map: &ChannelMap) -> PeakTable {
        let shape = (store.n_triggers(), store.n_boards(), store.n_channels());
        let mut peaks = Array3::from_elem(shape, Peak::NotEligible);
        for trigger in 0..store.n_triggers() {
            for (board, entry) in channel_map.iter() {
                if !self.is_eligible(trigger, board, entry) {
                    continue;
                }
                let channel = entry.channel_id;
                let histogram = store.time_histogram(trigger, board, channel);
                let peak = match self.estimator.estimate(histogram) {
                    Some(estimate) => Peak::Measured {
                        time: estimate.time,
                        time_error: estimate.uncertainty,
                        x: channel as f64,
                        x_error: CHANNEL_UNCERTAINTY,
                    },
                    None => Peak::Empty,
                };
                spdlog::debug!(
                    "trigger {trigger} board 0x{} ch {channel}: peak {:?} entries {} mean {:?}",
                    entry.board_id,
                    peak.time(),
                    histogram.entries(),
                    histogram.mean()
                );
                peaks[[trigger, board, channel]] = peak;
            }
        }
        PeakTable { peaks }
    }
}
