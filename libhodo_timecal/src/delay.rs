// Delay tables are what the v1495 firmware loads: one line per channel, `channel:f<hex delay>`.
use serde::Serialize;
use std::fmt::Write as FmtWrite;
use std::path::Path;

use super::config::CalibrationConstants;
use super::error::{DelayError, DelayTableError};
use super::peak::PeakTable;

/// The delays of one board, in TDC ticks, indexed by channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DelayTable {
    pub board: usize,
    delays: Vec<i64>,
}

impl DelayTable {
    pub fn new(board: usize, delays: Vec<i64>) -> Self {
        Self { board, delays }
    }

    /// Read a board's delay file
    pub fn read(board: usize, path: &Path) -> Result<Self, DelayTableError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DelayTableError::IOError(e, path.to_path_buf()))?;
        Self::parse(board, &contents)
    }

    /// Parse `channel:f<hex>` lines. Blank lines are ignored; entries must be in channel order
    pub fn parse(board: usize, contents: &str) -> Result<Self, DelayTableError> {
        let mut delays: Vec<i64> = Vec::new();
        for (line_idx, line) in contents.lines().enumerate() {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let bad_line = || DelayTableError::BadLine {
                board,
                line: line_idx + 1,
                text: text.to_string(),
            };

            let (channel, value) = text.split_once(':').ok_or_else(bad_line)?;
            let channel: usize = channel.trim().parse().map_err(|_| bad_line())?;
            let hex = value.trim().strip_prefix('f').ok_or_else(bad_line)?;
            // from_str_radix accepts a leading sign
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(bad_line());
            }
            let delay = u32::from_str_radix(hex, 16).map_err(|_| bad_line())?;

            if channel != delays.len() {
                return Err(DelayTableError::IndexMismatch {
                    board,
                    line: line_idx + 1,
                    found: channel,
                });
            }
            delays.push(delay as i64);
        }
        Ok(Self { board, delays })
    }

    pub fn get(&self, channel: usize) -> Option<i64> {
        self.delays.get(channel).copied()
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Render in the firmware format
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (channel, delay) in self.delays.iter().enumerate() {
            // Writing to a String cannot fail
            let _ = writeln!(text, "{channel}:f{delay:x}");
        }
        text
    }

    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        std::fs::write(path, self.to_text())
    }
}

/// Whether a channel's delay was moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DelayStatus {
    Updated,
    /// No usable peak on the primary trigger; the old delay is kept
    Unchanged,
}

/// Old and new delay of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayEntry {
    pub board: usize,
    pub channel: usize,
    pub old_delay: i64,
    pub new_delay: i64,
    pub peak_time: Option<f64>,
    pub status: DelayStatus,
}

/// Result of a correction pass: one new table per board plus the per-channel detail
#[derive(Debug, Clone, PartialEq)]
pub struct DelayCorrection {
    pub tables: Vec<DelayTable>,
    pub entries: Vec<DelayEntry>,
}

/// Shift delays so that each channel's primary-trigger peak lands on the reference time
#[derive(Debug, Clone)]
pub struct DelayCorrector {
    pub primary_trigger: usize,
    pub tick_conversion: f64,
    pub reference_time: i64,
}

/// new = (floor(peak / conversion) - reference) + old, all in ticks
pub fn compute_new_delay(
    old_delay: i64,
    peak_time: f64,
    tick_conversion: f64,
    reference_time: i64,
) -> i64 {
    let tdc_peak = (peak_time / tick_conversion).floor() as i64;
    (tdc_peak - reference_time) + old_delay
}

impl DelayCorrector {
    pub fn new(constants: &CalibrationConstants) -> Self {
        Self {
            primary_trigger: constants.primary_trigger,
            tick_conversion: constants.tick_conversion,
            reference_time: constants.reference_time,
        }
    }

    pub fn compute_new_delay(&self, old_delay: i64, peak_time: f64) -> i64 {
        compute_new_delay(
            old_delay,
            peak_time,
            self.tick_conversion,
            self.reference_time,
        )
    }

    /// Correct every board's delays using the peaks of the primary trigger.
    ///
    /// `old_tables` must hold one table per board in board order with an entry for every channel
    pub fn correct(
        &self,
        peaks: &PeakTable,
        old_tables: &[DelayTable],
    ) -> Result<DelayCorrection, DelayError> {
        let (_, n_boards, n_channels) = peaks.shape();
        if old_tables.len() != n_boards {
            return Err(DelayError::TableCount {
                found: old_tables.len(),
                expected: n_boards,
            });
        }

        let mut tables = Vec::with_capacity(n_boards);
        let mut entries = Vec::with_capacity(n_boards * n_channels);
        for (board, old_table) in old_tables.iter().enumerate() {
            if old_table.len() > n_channels {
                return Err(DelayError::ExtraDelays {
                    board,
                    found: old_table.len(),
                    expected: n_channels,
                });
            }
            let mut delays = Vec::with_capacity(n_channels);
            for channel in 0..n_channels {
                let old_delay = old_table
                    .get(channel)
                    .ok_or(DelayError::MissingDelay { board, channel })?;
                let peak_time = peaks.get(self.primary_trigger, board, channel).time();
                let (new_delay, status) = match peak_time {
                    Some(peak) => (self.compute_new_delay(old_delay, peak), DelayStatus::Updated),
                    None => (old_delay, DelayStatus::Unchanged),
                };
                if new_delay < 0 {
                    return Err(DelayError::NegativeDelay {
                        board,
                        channel,
                        delay: new_delay,
                    });
                }
                delays.push(new_delay);
                entries.push(DelayEntry {
                    board,
                    channel,
                    old_delay,
                    new_delay,
                    peak_time,
                    status,
                });
            }
            tables.push(DelayTable::new(board, delays));
        }

        Ok(DelayCorrection { tables, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tests::{hit, make_accumulator};
    use crate::channel_map::tests::make_map;
    use crate::config::Config;
    use crate::event::RawEvent;
    use crate::peak::PeakExtractor;

    fn table_text(n_channels: usize, delay: u32) -> String {
        (0..n_channels)
            .map(|ch| format!("{ch}:f{delay:x}\n"))
            .collect()
    }

    #[test]
    fn test_compute_new_delay() {
        assert_eq!(compute_new_delay(100, 660.0, 1.0, 650), 110);
        assert_eq!(compute_new_delay(100, 640.5, 1.0, 650), 90);
        assert_eq!(compute_new_delay(100, 1000.0, 25.0 / 16.0, 650), 90);
    }

    #[test]
    fn test_parse_table() {
        let table = DelayTable::parse(0, "0:f64\n1:f1a\n\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some(100));
        assert_eq!(table.get(1), Some(26));
        assert_eq!(table.get(2), None);
        assert_eq!(table.to_text(), "0:f64\n1:f1a\n");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            DelayTable::parse(3, "0:f64\n1:zz\n"),
            Err(DelayTableError::BadLine { board: 3, line: 2, .. })
        ));
        assert!(matches!(
            DelayTable::parse(0, "0:fgg\n"),
            Err(DelayTableError::BadLine { .. })
        ));
        assert!(matches!(
            DelayTable::parse(0, "0:f+64\n"),
            Err(DelayTableError::BadLine { .. })
        ));
        assert!(matches!(
            DelayTable::parse(0, "0:f\n"),
            Err(DelayTableError::BadLine { .. })
        ));
        assert!(matches!(
            DelayTable::parse(0, "0:f64\n2:f64\n"),
            Err(DelayTableError::IndexMismatch { found: 2, .. })
        ));
    }

    #[test]
    fn test_correct() {
        let config = Config::default();
        let map = make_map(&config);
        let mut acc = make_accumulator(&config);
        let event = RawEvent::new(
            1,
            14,
            1 << 5,
            vec![hit(0x420, 3, 640), hit(0x420, 3, 640), hit(0x480, 3, 600)],
        );
        acc.process_event(&event);
        let (store, _) = acc.finish();
        let peaks = PeakExtractor::new(&config.calibration).extract(&store, &map);

        let old: Vec<DelayTable> = (0..5)
            .map(|b| DelayTable::parse(b, &table_text(96, 100)).unwrap())
            .collect();
        let correction = DelayCorrector::new(&config.calibration)
            .correct(&peaks, &old)
            .unwrap();

        // Peak 640.5 -> 640 - 650 + 100
        assert_eq!(correction.tables[0].get(3), Some(90));
        // No peak: keep the old delay
        assert_eq!(correction.tables[0].get(4), Some(100));
        assert_eq!(correction.tables[4].get(3), Some(100));
        let entry = &correction.entries[3];
        assert_eq!((entry.board, entry.channel), (0, 3));
        assert_eq!(entry.status, DelayStatus::Updated);
        assert_eq!(correction.entries[4].status, DelayStatus::Unchanged);
        assert_eq!(correction.entries.len(), 5 * 96);
    }

    #[test]
    fn test_truncated_table_is_an_error() {
        let config = Config::default();
        let map = make_map(&config);
        let store = make_accumulator(&config).finish().0;
        let peaks = PeakExtractor::new(&config.calibration).extract(&store, &map);
        let mut old: Vec<DelayTable> = (0..5)
            .map(|b| DelayTable::parse(b, &table_text(96, 100)).unwrap())
            .collect();
        old[1] = DelayTable::parse(1, &table_text(80, 100)).unwrap();
        assert!(matches!(
            DelayCorrector::new(&config.calibration).correct(&peaks, &old),
            Err(DelayError::MissingDelay {
                board: 1,
                channel: 80
            })
        ));
    }

    #[test]
    fn test_oversized_table_is_an_error() {
        let config = Config::default();
        let map = make_map(&config);
        let store = make_accumulator(&config).finish().0;
        let peaks = PeakExtractor::new(&config.calibration).extract(&store, &map);
        let mut old: Vec<DelayTable> = (0..5)
            .map(|b| DelayTable::parse(b, &table_text(96, 100)).unwrap())
            .collect();
        old[2] = DelayTable::parse(2, &table_text(128, 100)).unwrap();
        assert!(matches!(
            DelayCorrector::new(&config.calibration).correct(&peaks, &old),
            Err(DelayError::ExtraDelays {
                board: 2,
                found: 128,
                expected: 96
            })
        ));
    }

    #[test]
    fn test_negative_delay_is_an_error() {
        let config = Config::default();
        let map = make_map(&config);
        let mut acc = make_accumulator(&config);
        acc.process_event(&RawEvent::new(1, 14, 1 << 5, vec![hit(0x430, 70, 510)]));
        let peaks = PeakExtractor::new(&config.calibration).extract(&acc.finish().0, &map);
        let old: Vec<DelayTable> = (0..5)
            .map(|b| DelayTable::parse(b, &table_text(96, 10)).unwrap())
            .collect();
        assert!(matches!(
            DelayCorrector::new(&config.calibration).correct(&peaks, &old),
            Err(DelayError::NegativeDelay {
                board: 1,
                channel: 70,
                delay: -130
            })
        ));
    }
}
