use serde::Serialize;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::accumulator::WarningSummary;
use super::channel_entry::ChannelEntry;
use super::channel_map::ChannelMap;
use super::config::Config;
use super::delay::DelayEntry;
use super::error::ReportError;
use super::peak::{Peak, PeakTable};
use super::time_store::TimeDistributionStore;

/// This is the version of the report format
const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerCount {
    pub trigger: usize,
    pub name: String,
    pub description: String,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakRecord {
    pub trigger: usize,
    pub board: usize,
    pub channel: usize,
    pub entries: u64,
    pub peak: Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedChannel {
    pub board: usize,
    #[serde(flatten)]
    pub entry: ChannelEntry,
}

/// Everything a calibration pass produced, in a form the plotting and bookkeeping tools can read
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub version: String,
    pub created: String,
    pub tag: String,
    pub runs: Vec<i32>,
    pub estimator: String,
    pub trigger_counts: Vec<TriggerCount>,
    pub data_quality: WarningSummary,
    /// Eligible channels only
    pub peaks: Vec<PeakRecord>,
    pub delays: Vec<DelayEntry>,
    pub channel_map: Vec<MappedChannel>,
}

impl CalibrationReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        estimator: &str,
        channel_map: &ChannelMap,
        store: &TimeDistributionStore,
        summary: &WarningSummary,
        peaks: &PeakTable,
        delays: &[DelayEntry],
    ) -> Result<Self, ReportError> {
        let trigger_counts = config
            .triggers
            .iter()
            .enumerate()
            .map(|(trigger, info)| TriggerCount {
                trigger,
                name: info.name.clone(),
                description: info.description.clone(),
                events: store.trigger_count(trigger),
            })
            .collect();

        let (n_triggers, _, _) = peaks.shape();
        let mut peak_records = Vec::new();
        for trigger in 0..n_triggers {
            for (board, entry) in channel_map.iter() {
                let peak = peaks.get(trigger, board, entry.channel_id);
                if *peak == Peak::NotEligible {
                    continue;
                }
                peak_records.push(PeakRecord {
                    trigger,
                    board,
                    channel: entry.channel_id,
                    entries: store
                        .time_histogram(trigger, board, entry.channel_id)
                        .entries(),
                    peak: *peak,
                });
            }
        }

        Ok(Self {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            created: OffsetDateTime::now_utc().format(&Rfc3339)?,
            tag: config.output_tag.clone(),
            runs: config.run_numbers.clone(),
            estimator: estimator.to_string(),
            trigger_counts,
            data_quality: summary.clone(),
            peaks: peak_records,
            delays: delays.to_vec(),
            channel_map: channel_map
                .iter()
                .map(|(board, entry)| MappedChannel {
                    board,
                    entry: entry.clone(),
                })
                .collect(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, ReportError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}
