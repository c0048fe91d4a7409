use ndarray::{Array2, Array3};

use super::accumulator::EventMultiplicity;
use super::config::CalibrationConstants;
use super::constants::*;
use super::error::HistogramError;
use super::histogram::{Axis, Histogram1D, Histogram2D};

/// All histograms of a calibration pass.
///
/// Everything is allocated up front for the fixed (trigger, board, channel) topology, so
/// every record call is a direct index. Stores with the same shape can be merged bin by bin,
/// which is how partial accumulations from several workers are combined.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDistributionStore {
    n_triggers: usize,
    n_boards: usize,
    n_channels: usize,
    trigger_counts: Vec<u64>,
    /// [trigger, board, channel] hit time
    time: Array3<Histogram1D>,
    /// [trigger, board, channel] channel multiplicity vs hit time
    time_vs_multiplicity: Array3<Histogram2D>,
    /// [trigger, board] channel vs hit time
    time_vs_channel: Array2<Histogram2D>,
    /// [trigger, board] hits per channel
    hits_vs_channel: Array2<Histogram1D>,
    /// [trigger, board] channel vs channel multiplicity
    multiplicity_vs_channel: Array2<Histogram2D>,
    /// [trigger, board] hits per board
    board_multiplicity: Array2<Histogram1D>,
    /// [trigger, board, station] hits per board and station
    board_station_multiplicity: Array3<Histogram1D>,
    /// [trigger, station] hodoscope hits per station
    hodo_station_multiplicity: Array2<Histogram1D>,
    /// [trigger] hodoscope hits
    hodo_multiplicity: Vec<Histogram1D>,
}

fn multiplicity_histogram(max_multiplicity: usize, scale: usize) -> Histogram1D {
    let n_bins = max_multiplicity * scale;
    Histogram1D::new(n_bins, 0.0, n_bins as f64)
}

impl TimeDistributionStore {
    pub fn new(n_triggers: usize, n_boards: usize, constants: &CalibrationConstants) -> Self {
        let n_channels = constants.n_channels;
        let max_multi = constants.max_multiplicity;
        let time_axis = Axis::new(
            constants.time_bins(),
            constants.time_min(),
            constants.time_max(),
        );
        let channel_axis = Axis::new(n_channels, 0.0, n_channels as f64);
        let multi_axis = Axis::new(max_multi, 0.0, max_multi as f64);

        let per_channel = (n_triggers, n_boards, n_channels);
        let per_board = (n_triggers, n_boards);

        Self {
            n_triggers,
            n_boards,
            n_channels,
            trigger_counts: vec![0; n_triggers],
            time: Array3::from_elem(
                per_channel,
                Histogram1D::new(time_axis.n_bins, time_axis.min, time_axis.max),
            ),
            time_vs_multiplicity: Array3::from_elem(
                per_channel,
                Histogram2D::new(multi_axis, time_axis),
            ),
            time_vs_channel: Array2::from_elem(
                per_board,
                Histogram2D::new(channel_axis, time_axis),
            ),
            hits_vs_channel: Array2::from_elem(
                per_board,
                Histogram1D::new(n_channels, 0.0, n_channels as f64),
            ),
            multiplicity_vs_channel: Array2::from_elem(
                per_board,
                Histogram2D::new(channel_axis, multi_axis),
            ),
            board_multiplicity: Array2::from_elem(
                per_board,
                multiplicity_histogram(max_multi, BOARD_MULTIPLICITY_SCALE),
            ),
            board_station_multiplicity: Array3::from_elem(
                (n_triggers, n_boards, NUMBER_OF_HODO_STATIONS),
                multiplicity_histogram(max_multi, BOARD_STATION_MULTIPLICITY_SCALE),
            ),
            hodo_station_multiplicity: Array2::from_elem(
                (n_triggers, NUMBER_OF_HODO_STATIONS),
                multiplicity_histogram(max_multi, HODO_STATION_MULTIPLICITY_SCALE),
            ),
            hodo_multiplicity: vec![
                multiplicity_histogram(max_multi, HODO_TOTAL_MULTIPLICITY_SCALE);
                n_triggers
            ],
        }
    }

    pub fn n_triggers(&self) -> usize {
        self.n_triggers
    }

    pub fn n_boards(&self) -> usize {
        self.n_boards
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Count one event for a trigger kind
    pub fn record_trigger(&mut self, trigger: usize) {
        self.trigger_counts[trigger] += 1;
    }

    /// Add one hit time to a channel's time distribution
    pub fn record_hit(&mut self, trigger: usize, board: usize, channel: usize, time: f64) {
        self.time[[trigger, board, channel]].fill(time);
        self.time_vs_channel[[trigger, board]].fill(channel as f64, time);
    }

    /// Add one hit time against the number of hits its channel had in the event
    pub fn record_time_multiplicity(
        &mut self,
        trigger: usize,
        board: usize,
        channel: usize,
        n_hits: usize,
        time: f64,
    ) {
        self.time_vs_multiplicity[[trigger, board, channel]].fill(n_hits as f64, time);
    }

    /// Record how many hits a channel had in an event, including zero
    pub fn record_channel_multiplicity(
        &mut self,
        trigger: usize,
        board: usize,
        channel: usize,
        n_hits: usize,
    ) {
        self.multiplicity_vs_channel[[trigger, board]].fill(channel as f64, n_hits as f64);
        if n_hits > 0 {
            self.hits_vs_channel[[trigger, board]].fill_weighted(channel as f64, n_hits as u64);
        }
    }

    /// Fill the board, station and hodoscope multiplicities of one event
    pub fn record_multiplicity(&mut self, trigger: usize, multiplicity: &EventMultiplicity) {
        self.hodo_multiplicity[trigger].fill(multiplicity.hodo_total as f64);
        for (station, n_hits) in multiplicity.hodo_station.iter().enumerate() {
            self.hodo_station_multiplicity[[trigger, station]].fill(*n_hits as f64);
        }
        for (board, n_hits) in multiplicity.board.iter().enumerate() {
            self.board_multiplicity[[trigger, board]].fill(*n_hits as f64);
            for station in 0..NUMBER_OF_HODO_STATIONS {
                self.board_station_multiplicity[[trigger, board, station]]
                    .fill(multiplicity.board_station[[board, station]] as f64);
            }
        }
    }

    pub fn trigger_count(&self, trigger: usize) -> u64 {
        self.trigger_counts[trigger]
    }

    pub fn trigger_counts(&self) -> &[u64] {
        &self.trigger_counts
    }

    pub fn time_histogram(&self, trigger: usize, board: usize, channel: usize) -> &Histogram1D {
        &self.time[[trigger, board, channel]]
    }

    pub fn time_vs_multiplicity(
        &self,
        trigger: usize,
        board: usize,
        channel: usize,
    ) -> &Histogram2D {
        &self.time_vs_multiplicity[[trigger, board, channel]]
    }

    pub fn time_vs_channel(&self, trigger: usize, board: usize) -> &Histogram2D {
        &self.time_vs_channel[[trigger, board]]
    }

    pub fn hits_vs_channel(&self, trigger: usize, board: usize) -> &Histogram1D {
        &self.hits_vs_channel[[trigger, board]]
    }

    pub fn multiplicity_vs_channel(&self, trigger: usize, board: usize) -> &Histogram2D {
        &self.multiplicity_vs_channel[[trigger, board]]
    }

    pub fn board_multiplicity(&self, trigger: usize, board: usize) -> &Histogram1D {
        &self.board_multiplicity[[trigger, board]]
    }

    pub fn board_station_multiplicity(
        &self,
        trigger: usize,
        board: usize,
        station: usize,
    ) -> &Histogram1D {
        &self.board_station_multiplicity[[trigger, board, station]]
    }

    pub fn hodo_station_multiplicity(&self, trigger: usize, station: usize) -> &Histogram1D {
        &self.hodo_station_multiplicity[[trigger, station]]
    }

    pub fn hodo_multiplicity(&self, trigger: usize) -> &Histogram1D {
        &self.hodo_multiplicity[trigger]
    }

    /// Add another store of the same shape into this one, bin by bin
    pub fn merge(&mut self, other: &TimeDistributionStore) -> Result<(), HistogramError> {
        let mine = (self.n_triggers, self.n_boards, self.n_channels);
        let theirs = (other.n_triggers, other.n_boards, other.n_channels);
        if mine != theirs {
            return Err(HistogramError::BinningMismatch(format!(
                "store shape {mine:?} vs {theirs:?}"
            )));
        }

        for (a, b) in self.trigger_counts.iter_mut().zip(&other.trigger_counts) {
            *a += *b;
        }
        merge_all(self.time.iter_mut(), other.time.iter())?;
        merge_all_2d(
            self.time_vs_multiplicity.iter_mut(),
            other.time_vs_multiplicity.iter(),
        )?;
        merge_all_2d(self.time_vs_channel.iter_mut(), other.time_vs_channel.iter())?;
        merge_all(self.hits_vs_channel.iter_mut(), other.hits_vs_channel.iter())?;
        merge_all_2d(
            self.multiplicity_vs_channel.iter_mut(),
            other.multiplicity_vs_channel.iter(),
        )?;
        merge_all(
            self.board_multiplicity.iter_mut(),
            other.board_multiplicity.iter(),
        )?;
        merge_all(
            self.board_station_multiplicity.iter_mut(),
            other.board_station_multiplicity.iter(),
        )?;
        merge_all(
            self.hodo_station_multiplicity.iter_mut(),
            other.hodo_station_multiplicity.iter(),
        )?;
        merge_all(
            self.hodo_multiplicity.iter_mut(),
            other.hodo_multiplicity.iter(),
        )?;
        Ok(())
    }
}

fn merge_all<'a>(
    mine: impl Iterator<Item = &'a mut Histogram1D>,
    theirs: impl Iterator<Item = &'a Histogram1D>,
) -> Result<(), HistogramError> {
    for (a, b) in mine.zip(theirs) {
        a.merge(b)?;
    }
    Ok(())
}

fn merge_all_2d<'a>(
    mine: impl Iterator<Item = &'a mut Histogram2D>,
    theirs: impl Iterator<Item = &'a Histogram2D>,
) -> Result<(), HistogramError> {
    for (a, b) in mine.zip(theirs) {
        a.merge(b)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tests::{hit, make_accumulator};
    use crate::config::Config;
    use crate::event::RawEvent;

    fn make_events() -> Vec<RawEvent> {
        (0..40u32)
            .map(|i| {
                let mask = if i % 3 == 0 { 1 << 5 } else { (1 << 6) | (1 << 8) };
                let event_type = if i % 7 == 0 { 10 } else { 14 };
                RawEvent::new(
                    i,
                    event_type,
                    mask,
                    vec![
                        hit(0x420, i % 96, 560 + i),
                        hit(0x430, 70, 600 + (i % 5)),
                        hit(0x420, i % 96, 570 + i),
                        hit(0x480, 200, 600),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn test_record_hit() {
        let config = Config::default();
        let mut store = TimeDistributionStore::new(12, 5, &config.calibration);
        store.record_hit(5, 1, 70, 603.0);
        assert_eq!(store.time_histogram(5, 1, 70).mode_bin_center(), Some(603.5));
        assert_eq!(store.time_vs_channel(5, 1).get(70, 103), 1);
        assert_eq!(store.time_histogram(5, 1, 71).entries(), 0);
    }

    #[test]
    fn test_conversion_scales_window() {
        let mut config = Config::default();
        config.calibration.tick_conversion = 25.0 / 16.0;
        let store = TimeDistributionStore::new(12, 5, &config.calibration);
        let axis = store.time_histogram(0, 0, 0).axis();
        assert_eq!(axis.n_bins, 150);
        assert_eq!(axis.min, 500.0 * 25.0 / 16.0);
        assert_eq!(axis.max, 650.0 * 25.0 / 16.0);
    }

    #[test]
    fn test_partitioned_merge_matches_single_pass() {
        let config = Config::default();
        let events = make_events();

        let mut single = make_accumulator(&config);
        for event in events.iter() {
            single.process_event(event);
        }

        let mut first = make_accumulator(&config);
        let mut second = make_accumulator(&config);
        for (idx, event) in events.iter().enumerate() {
            if idx % 2 == 0 {
                first.process_event(event);
            } else {
                second.process_event(event);
            }
        }

        let (mut merged_a, _) = first.finish();
        let (merged_b, _) = second.finish();
        let mut merged_c = merged_b.clone();
        merged_a.merge(&merged_b).unwrap();
        assert_eq!(&merged_a, single.store());

        // Order of merging does not matter
        let (first_again, _) = {
            let mut acc = make_accumulator(&config);
            for event in events.iter().step_by(2) {
                acc.process_event(event);
            }
            acc.finish()
        };
        merged_c.merge(&first_again).unwrap();
        assert_eq!(&merged_c, single.store());
    }

    #[test]
    fn test_merge_shape_mismatch() {
        let config = Config::default();
        let mut a = TimeDistributionStore::new(12, 5, &config.calibration);
        let b = TimeDistributionStore::new(12, 4, &config.calibration);
        assert!(a.merge(&b).is_err());
    }
}
