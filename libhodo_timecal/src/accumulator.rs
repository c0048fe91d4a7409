use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::channel_map::{is_sentinel_channel, ChannelMap};
use super::config::CalibrationConstants;
use super::constants::{MAX_RETAINED_WARNINGS, NUMBER_OF_HODO_STATIONS};
use super::event::{EventSource, RawEvent};
use super::time_store::TimeDistributionStore;

/// Why a hit could not be placed on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BadHitKind {
    UnknownBoard,
    ChannelOutOfRange,
    Both,
}

/// A hit that could not be resolved against the channel map. The rest of the event is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQualityWarning {
    pub run_number: i32,
    pub event_index: u64,
    pub event_id: u32,
    pub hit_index: usize,
    pub board_id_raw: u32,
    pub channel_id_raw: u32,
    pub kind: BadHitKind,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bad data in run {} event {} (id {}) hit {}: {:?} -- board id {:#x} channel id {}",
            self.run_number,
            self.event_index,
            self.event_id,
            self.hit_index,
            self.kind,
            self.board_id_raw,
            self.channel_id_raw
        )
    }
}

/// Per-run event and data quality bookkeeping. Only the first few warnings are kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarningSummary {
    pub events_seen: u64,
    pub events_accumulated: u64,
    pub non_physics_events: u64,
    pub rejected_events: u64,
    pub events_with_bad_hits: u64,
    pub bad_hits: u64,
    pub warnings: Vec<DataQualityWarning>,
}

impl WarningSummary {
    pub fn record_warning(&mut self, warning: DataQualityWarning) {
        self.bad_hits += 1;
        if self.warnings.len() < MAX_RETAINED_WARNINGS {
            self.warnings.push(warning);
        }
    }

    pub fn merge(&mut self, other: &WarningSummary) {
        self.events_seen += other.events_seen;
        self.events_accumulated += other.events_accumulated;
        self.non_physics_events += other.non_physics_events;
        self.rejected_events += other.rejected_events;
        self.events_with_bad_hits += other.events_with_bad_hits;
        self.bad_hits += other.bad_hits;
        let room = MAX_RETAINED_WARNINGS.saturating_sub(self.warnings.len());
        self.warnings
            .extend(other.warnings.iter().take(room).cloned());
    }
}

/// Hit counts of one event, used only for the multiplicity diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct EventMultiplicity {
    /// Hits per board, sentinel channels excluded
    pub board: Vec<u64>,
    /// Hits per (board, station)
    pub board_station: Array2<u64>,
    /// Hits summed over the hodoscope boards
    pub hodo_total: u64,
    pub hodo_station: [u64; NUMBER_OF_HODO_STATIONS],
}

impl EventMultiplicity {
    pub fn new(n_boards: usize) -> Self {
        Self {
            board: vec![0; n_boards],
            board_station: Array2::zeros((n_boards, NUMBER_OF_HODO_STATIONS)),
            hodo_total: 0,
            hodo_station: [0; NUMBER_OF_HODO_STATIONS],
        }
    }

    fn clear(&mut self) {
        self.board.iter_mut().for_each(|n| *n = 0);
        self.board_station.fill(0);
        self.hodo_total = 0;
        self.hodo_station = [0; NUMBER_OF_HODO_STATIONS];
    }
}

/// Per-event grouping of hit times by channel.
///
/// Allocated once for the whole topology; only the lists touched by an event are cleared
/// afterwards, so the hot loop does not reallocate.
#[derive(Debug, Clone)]
pub struct HitScratch {
    n_channels: usize,
    times: Vec<Vec<u32>>,
    touched: Vec<usize>,
}

impl HitScratch {
    pub fn new(n_boards: usize, n_channels: usize) -> Self {
        Self {
            n_channels,
            times: vec![Vec::new(); n_boards * n_channels],
            touched: Vec::new(),
        }
    }

    pub fn push(&mut self, board: usize, channel: usize, tdc_time: u32) {
        let idx = board * self.n_channels + channel;
        if self.times[idx].is_empty() {
            self.touched.push(idx);
        }
        self.times[idx].push(tdc_time);
    }

    /// Hit times of a channel in arrival order
    pub fn get(&self, board: usize, channel: usize) -> &[u32] {
        &self.times[board * self.n_channels + channel]
    }

    pub fn clear(&mut self) {
        for idx in self.touched.drain(..) {
            self.times[idx].clear();
        }
    }
}

/// What happened to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a physics event
    Skipped,
    /// Had unresolvable hits and bad events are configured to be dropped
    Rejected,
    /// Accumulated once per fired trigger kind; `bad_hits` were left out
    Accumulated { bad_hits: usize },
}

/// EventAccumulator takes decoded events and fills a [`TimeDistributionStore`].
///
/// One accumulator is used per worker. The stores of several workers are merged afterwards.
#[derive(Debug)]
pub struct EventAccumulator {
    channel_map: Arc<ChannelMap>,
    constants: CalibrationConstants,
    n_triggers: usize,
    store: TimeDistributionStore,
    scratch: HitScratch,
    multiplicity: EventMultiplicity,
    summary: WarningSummary,
    run_number: i32,
    event_index: u64,
}

impl EventAccumulator {
    /// Create a new EventAccumulator.
    ///
    /// Requires the ChannelMap; all histograms are allocated here
    pub fn new(
        channel_map: Arc<ChannelMap>,
        n_triggers: usize,
        constants: &CalibrationConstants,
    ) -> Self {
        let n_boards = channel_map.n_boards();
        let n_channels = channel_map.n_channels();
        Self {
            store: TimeDistributionStore::new(n_triggers, n_boards, constants),
            scratch: HitScratch::new(n_boards, n_channels),
            multiplicity: EventMultiplicity::new(n_boards),
            summary: WarningSummary::default(),
            constants: constants.clone(),
            channel_map,
            n_triggers,
            run_number: 0,
            event_index: 0,
        }
    }

    /// Start a new run file. Event indices in warnings restart at zero
    pub fn begin_run(&mut self, run_number: i32) {
        self.run_number = run_number;
        self.event_index = 0;
    }

    pub fn store(&self) -> &TimeDistributionStore {
        &self.store
    }

    pub fn summary(&self) -> &WarningSummary {
        &self.summary
    }

    /// Hand back the filled store and the data quality summary
    pub fn finish(self) -> (TimeDistributionStore, WarningSummary) {
        (self.store, self.summary)
    }

    /// Add one event.
    pub fn process_event(&mut self, event: &RawEvent) -> EventOutcome {
        let event_index = self.event_index;
        self.event_index += 1;
        self.summary.events_seen += 1;

        if event.event_type != self.constants.physics_event_type {
            self.summary.non_physics_events += 1;
            return EventOutcome::Skipped;
        }

        let bad_hits = self.group_hits(event, event_index);
        if bad_hits > 0 {
            self.summary.events_with_bad_hits += 1;
            if self.constants.reject_events_with_bad_hits {
                self.summary.rejected_events += 1;
                self.scratch.clear();
                return EventOutcome::Rejected;
            }
        }

        self.count_multiplicity();
        for trigger in event.fired_triggers(self.n_triggers) {
            self.fill_trigger(trigger);
        }
        self.scratch.clear();
        self.summary.events_accumulated += 1;

        EventOutcome::Accumulated { bad_hits }
    }

    /// Feed every event of a source, returning how many were read
    pub fn process_source<S: EventSource>(&mut self, source: &mut S) -> Result<u64, S::Error> {
        let mut n_events = 0;
        while let Some(event) = source.next_event()? {
            self.process_event(&event);
            n_events += 1;
        }
        Ok(n_events)
    }

    /// Sort the hits of an event into the scratch buffer, returning how many were unusable
    fn group_hits(&mut self, event: &RawEvent, event_index: u64) -> usize {
        let mut bad_hits = 0;
        for (hit_index, hit) in event.hits.iter().enumerate() {
            let board = self.channel_map.resolve_board(hit.board_id_raw);
            let channel = self.channel_map.resolve_channel(hit.channel_id_raw);
            let kind = match (board, channel) {
                (Some(b), Some(c)) => {
                    self.scratch.push(b, c, hit.tdc_time);
                    continue;
                }
                (None, Some(_)) => BadHitKind::UnknownBoard,
                (Some(_), None) => BadHitKind::ChannelOutOfRange,
                (None, None) => BadHitKind::Both,
            };
            let warning = DataQualityWarning {
                run_number: self.run_number,
                event_index,
                event_id: event.event_id,
                hit_index,
                board_id_raw: hit.board_id_raw,
                channel_id_raw: hit.channel_id_raw,
                kind,
            };
            spdlog::warn!("{warning}");
            self.summary.record_warning(warning);
            bad_hits += 1;
        }
        bad_hits
    }

    fn count_multiplicity(&mut self) {
        self.multiplicity.clear();
        let hodo_boards = self.constants.hodoscope_boards;
        for (board, entry) in self.channel_map.iter() {
            if is_sentinel_channel(entry.channel_id) {
                continue;
            }
            let n_hits = self.scratch.get(board, entry.channel_id).len() as u64;
            if n_hits == 0 {
                continue;
            }
            self.multiplicity.board[board] += n_hits;
            if board < hodo_boards {
                self.multiplicity.hodo_total += n_hits;
            }
            if let Some(station) = entry.station_index() {
                self.multiplicity.board_station[[board, station]] += n_hits;
                if board < hodo_boards {
                    self.multiplicity.hodo_station[station] += n_hits;
                }
            }
        }
    }

    fn fill_trigger(&mut self, trigger: usize) {
        self.store.record_trigger(trigger);
        self.store.record_multiplicity(trigger, &self.multiplicity);

        let conversion = self.constants.tick_conversion;
        for board in 0..self.channel_map.n_boards() {
            for channel in 0..self.channel_map.n_channels() {
                if is_sentinel_channel(channel) {
                    continue;
                }
                let times = self.scratch.get(board, channel);
                let n_hits = times.len();
                self.store
                    .record_channel_multiplicity(trigger, board, channel, n_hits);
                for tdc_time in times {
                    let time = *tdc_time as f64 * conversion;
                    self.store.record_hit(trigger, board, channel, time);
                    self.store
                        .record_time_multiplicity(trigger, board, channel, n_hits, time);
                }
            }
        }
    }
}
