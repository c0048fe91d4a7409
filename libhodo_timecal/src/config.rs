use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::*;
use super::error::ConfigError;

/// One trigger kind. Its position in [`Config::triggers`] is its bit in the trigger mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub description: String,
}

impl TriggerInfo {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// One v1495 TDC board. Its position in [`Config::boards`] is its board index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Hex coded board id as it appears in the data stream
    pub id: String,
    pub label: String,
    pub mapping_path: PathBuf,
    pub delay_path: PathBuf,
}

impl BoardInfo {
    pub fn new(id: &str, label: &str, index: usize) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            mapping_path: PathBuf::from(format!("Mapping/{id}mapping.txt")),
            delay_path: PathBuf::from(format!("Timing/time_{index}.txt")),
        }
    }

    /// The raw id the TDC writes into the data stream
    pub fn raw_id(&self) -> Option<u32> {
        u32::from_str_radix(&self.id, 16).ok()
    }
}

/// Which estimator turns a time distribution into a peak time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PeakEstimatorKind {
    Mode,
    Gaussian {
        #[serde(default = "default_window_bins")]
        window_bins: usize,
    },
}

fn default_window_bins() -> usize {
    DEFAULT_GAUSSIAN_WINDOW_BINS
}

/// The numeric constants of a calibration pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConstants {
    pub n_channels: usize,
    pub tick_conversion: f64,
    pub reference_time: i64,
    pub tdc_min: u32,
    pub tdc_max: u32,
    pub physics_event_type: u32,
    pub eligible_triggers: Vec<usize>,
    pub primary_trigger: usize,
    pub eligible_boards: usize,
    pub hodoscope_boards: usize,
    pub max_multiplicity: usize,
    pub peak_uncertainty: f64,
    pub peak_estimator: PeakEstimatorKind,
    pub reject_events_with_bad_hits: bool,
}

impl Default for CalibrationConstants {
    fn default() -> Self {
        Self {
            n_channels: DEFAULT_NUMBER_OF_CHANNELS,
            tick_conversion: DEFAULT_TICK_CONVERSION,
            reference_time: DEFAULT_REFERENCE_TIME,
            tdc_min: DEFAULT_TDC_MIN,
            tdc_max: DEFAULT_TDC_MAX,
            physics_event_type: DEFAULT_PHYSICS_EVENT_TYPE,
            eligible_triggers: DEFAULT_ELIGIBLE_TRIGGERS.to_vec(),
            primary_trigger: DEFAULT_PRIMARY_TRIGGER,
            eligible_boards: DEFAULT_ELIGIBLE_BOARDS,
            hodoscope_boards: DEFAULT_HODOSCOPE_BOARDS,
            max_multiplicity: DEFAULT_MAX_MULTIPLICITY,
            peak_uncertainty: DEFAULT_PEAK_UNCERTAINTY,
            peak_estimator: PeakEstimatorKind::Mode,
            reject_events_with_bad_hits: false,
        }
    }
}

impl CalibrationConstants {
    /// Lower edge of the analysis window in converted time units
    pub fn time_min(&self) -> f64 {
        self.tdc_min as f64 * self.tick_conversion
    }

    /// Upper edge of the analysis window in converted time units
    pub fn time_max(&self) -> f64 {
        self.tdc_max as f64 * self.tick_conversion
    }

    /// One bin per tick inside the window
    pub fn time_bins(&self) -> usize {
        (self.tdc_max - self.tdc_min) as usize
    }
}

/// Structure representing the application configuration. Contains pathing, run and hardware information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub output_tag: String,
    pub run_numbers: Vec<i32>,
    pub n_threads: i32,
    pub boards: Vec<BoardInfo>,
    pub triggers: Vec<TriggerInfo>,
    pub calibration: CalibrationConstants,
}

impl Default for Config {
    /// Generate a new Config describing the standard hodoscope readout. Paths are placeholders
    fn default() -> Self {
        let boards = [
            ("420", "XT Lv-A"),
            ("430", "XB Lv-A"),
            ("460", "XT Lv-B"),
            ("470", "XB Lv-B"),
            ("480", "XT Lv-C"),
        ]
        .iter()
        .enumerate()
        .map(|(idx, (id, label))| BoardInfo::new(id, label, idx))
        .collect();

        let triggers = vec![
            TriggerInfo::new("FPGA1", "ST 2 & 4"),
            TriggerInfo::new("FPGA2", "ST 2T & 4T"),
            TriggerInfo::new("FPGA3", "ST 2T & 4B"),
            TriggerInfo::new("FPGA4", "ST 2B & 4T"),
            TriggerInfo::new("FPGA5", "ST 2B & 4B"),
            TriggerInfo::new("NIM1", "ST 1 & 2 & 3 & 4"),
            TriggerInfo::new("NIM2", "ST 1 & 2"),
            TriggerInfo::new("NIM3", "Random"),
            TriggerInfo::new("NIM4", "ST 2 & 4"),
            TriggerInfo::new("NIM5", "Flush"),
            TriggerInfo::new("BOS", "Begin of spill"),
            TriggerInfo::new("EOS", "End of spill"),
        ];

        Self {
            data_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            output_tag: String::from("calib"),
            run_numbers: vec![],
            n_threads: 1,
            boards,
            triggers,
            calibration: CalibrationConstants::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check that the hardware description and constants are self consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cal = &self.calibration;
        let n_trig = self.n_triggers();
        if n_trig == 0 || n_trig > MAX_TRIGGER_KINDS {
            return Err(ConfigError::InvalidValue(format!(
                "{n_trig} trigger kinds; must be between 1 and {MAX_TRIGGER_KINDS}"
            )));
        }
        if self.boards.is_empty() {
            return Err(ConfigError::InvalidValue(String::from("no boards")));
        }
        if let Some(board) = self.boards.iter().find(|b| b.raw_id().is_none()) {
            return Err(ConfigError::InvalidValue(format!(
                "board id {} is not hex",
                board.id
            )));
        }
        for (idx, board) in self.boards.iter().enumerate() {
            if let Some(first) = self.boards[..idx]
                .iter()
                .position(|other| other.raw_id() == board.raw_id())
            {
                return Err(ConfigError::InvalidValue(format!(
                    "board {idx} reuses the id {} of board {first}",
                    board.id
                )));
            }
        }
        if cal.n_channels == 0 {
            return Err(ConfigError::InvalidValue(String::from("zero channels")));
        }
        if cal.tdc_max <= cal.tdc_min {
            return Err(ConfigError::InvalidValue(format!(
                "empty TDC window [{}, {}]",
                cal.tdc_min, cal.tdc_max
            )));
        }
        if cal.tick_conversion.is_nan() || cal.tick_conversion <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "tick conversion {} must be positive",
                cal.tick_conversion
            )));
        }
        if cal.primary_trigger >= n_trig {
            return Err(ConfigError::InvalidValue(format!(
                "primary trigger {} outside of {n_trig} trigger kinds",
                cal.primary_trigger
            )));
        }
        if let Some(t) = cal.eligible_triggers.iter().find(|t| **t >= n_trig) {
            return Err(ConfigError::InvalidValue(format!(
                "eligible trigger {t} outside of {n_trig} trigger kinds"
            )));
        }
        if cal.max_multiplicity == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "max multiplicity must be at least 1",
            )));
        }
        Ok(())
    }

    pub fn n_triggers(&self) -> usize {
        self.triggers.len()
    }

    pub fn n_boards(&self) -> usize {
        self.boards.len()
    }

    /// Get the path to a run file
    pub fn get_run_file(&self, run_number: i32) -> PathBuf {
        self.data_path.join(format!("{}.tdc", self.get_run_str(run_number)))
    }

    /// Check if a specific run exists by evaluating the existance of its run file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_run_file(run_number).exists()
    }

    /// Get the path of the new delay file for a board
    pub fn get_delay_output_file(&self, board: usize) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self
                .output_path
                .join(format!("time_{board}_{}.txt", self.output_tag)))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    /// Get the path of the calibration report
    pub fn get_report_file(&self) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self
                .output_path
                .join(format!("timecal_{}.yml", self.output_tag)))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    /// Human readable list of the runs, used in labels
    pub fn run_label(&self) -> String {
        let runs: Vec<String> = self.run_numbers.iter().map(|r| r.to_string()).collect();
        format!("run {}", runs.join(" "))
    }

    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_triggers(), 12);
        assert_eq!(config.n_boards(), 5);
        assert_eq!(config.triggers[5].name, "NIM1");
        assert_eq!(config.boards[4].raw_id(), Some(0x480));
        assert_eq!(config.calibration.time_bins(), 150);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.calibration.peak_estimator = PeakEstimatorKind::Gaussian { window_bins: 7 };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.calibration, config.calibration);
        assert_eq!(back.boards, config.boards);
    }

    #[test]
    fn test_gaussian_window_default() {
        let kind: PeakEstimatorKind = serde_yaml::from_str("kind: Gaussian").unwrap();
        assert_eq!(kind, PeakEstimatorKind::Gaussian { window_bins: 10 });
        let kind: PeakEstimatorKind = serde_yaml::from_str("kind: Mode").unwrap();
        assert_eq!(kind, PeakEstimatorKind::Mode);
    }

    #[test]
    fn test_rejects_bad_primary_trigger() {
        let mut config = Config::default();
        config.calibration.primary_trigger = 12;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_rejects_empty_window() {
        let mut config = Config::default();
        config.calibration.tdc_max = config.calibration.tdc_min;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_board() {
        let mut config = Config::default();
        config.boards[3].id = String::from("420");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
        // Same id written differently
        config.boards[3].id = String::from("0420");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_hex_board() {
        let mut config = Config::default();
        config.boards[2].id = String::from("xyz");
        assert!(config.validate().is_err());
    }
}
