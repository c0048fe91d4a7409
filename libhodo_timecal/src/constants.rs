// Readout topology defaults (E1039 hodoscope v1495 TDCs)
pub const DEFAULT_NUMBER_OF_CHANNELS: usize = 96; // per board
pub const DEFAULT_HODOSCOPE_BOARDS: usize = 2; // boards summed into the hodoscope multiplicity
pub const DEFAULT_ELIGIBLE_BOARDS: usize = 4; // boards with timing peaks; the last board is excluded
pub const NUMBER_OF_HODO_STATIONS: usize = 4;
pub const MAX_TRIGGER_KINDS: usize = 32; // one bit per kind in a u32 mask
pub const MAX_HITS_PER_EVENT: usize = 1000; // size of the readout hit buffer

// Channel index layout within a board
pub const SENTINEL_CHANNEL_A: usize = 64;
pub const SENTINEL_CHANNEL_B: usize = 65;
pub const NOT_HODO_DISCRIMINATOR: u8 = 5;

// Timing defaults
pub const DEFAULT_TICK_CONVERSION: f64 = 1.0; // 1 for raw ticks, 25/16 for ns with a 40 MHz clock
pub const DEFAULT_REFERENCE_TIME: i64 = 650;
pub const DEFAULT_TDC_MIN: u32 = 500;
pub const DEFAULT_TDC_MAX: u32 = 650;
pub const DEFAULT_PEAK_UNCERTAINTY: f64 = 15.0; // in ticks, scaled by the conversion
pub const CHANNEL_UNCERTAINTY: f64 = 1.0;
pub const DEFAULT_GAUSSIAN_WINDOW_BINS: usize = 10;

// Event selection
pub const DEFAULT_PHYSICS_EVENT_TYPE: u32 = 14;
pub const DEFAULT_PRIMARY_TRIGGER: usize = 5; // NIM1
pub const DEFAULT_ELIGIBLE_TRIGGERS: [usize; 3] = [5, 6, 8]; // NIM1, NIM2, NIM4 cosmics

// Diagnostics
pub const DEFAULT_MAX_MULTIPLICITY: usize = 10;
pub const BOARD_MULTIPLICITY_SCALE: usize = 100;
pub const BOARD_STATION_MULTIPLICITY_SCALE: usize = 20;
pub const HODO_STATION_MULTIPLICITY_SCALE: usize = 40;
pub const HODO_TOTAL_MULTIPLICITY_SCALE: usize = 200;
pub const MAX_RETAINED_WARNINGS: usize = 100;

/// Marker written into plotting arrays for channels without a peak
pub const NO_DATA_MARKER: f64 = -9999.0;

/// Discriminator names by id, the last one covers G port and empty channels
pub const DISCRIMINATOR_NAMES: [&str; 6] = ["ST1", "ST2", "ST3", "ST4a", "ST4b", "NotHodo"];
