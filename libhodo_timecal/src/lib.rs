//! # hodo_timecal
//!
//! hodo_timecal is the channel time calibration for the hodoscope TDC readout, written in
//! Rust. It reads raw TDC run files, builds per trigger, per board, per channel time
//! distributions, finds the arrival time peak of every hodoscope channel and shifts the
//! per channel delays so that the peaks of the primary trigger line up on a common
//! reference time. The new delay tables are written in the same format the readout
//! firmware loads.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./hodo_timecal_cli` from the
//! top level repository. To use the CLI see the `hodo_timecal_cli` README.
//!
//! ## Configuration
//!
//! A configuration is a YAML file. A template can be generated with
//! `hodo_timecal_cli new -p <path>`. The format is as follows:
//!
//! ```yml
//! data_path: /data/tdc
//! output_path: /data/timing
//! output_tag: calib
//! run_numbers: [1021, 1022]
//! n_threads: 2
//! boards:
//! - id: '420'
//!   label: XT Lv-A
//!   mapping_path: Mapping/420mapping.txt
//!   delay_path: Timing/time_0.txt
//! # ... one entry per board, in readout order
//! triggers:
//! - name: FPGA1
//!   description: ST 2 & 4
//! # ... one entry per trigger bit
//! calibration:
//!   n_channels: 96
//!   tick_conversion: 1.0
//!   reference_time: 650
//!   tdc_min: 500
//!   tdc_max: 650
//!   physics_event_type: 14
//!   eligible_triggers: [5, 6, 8]
//!   primary_trigger: 5
//!   eligible_boards: 4
//!   hodoscope_boards: 2
//!   max_multiplicity: 10
//!   peak_uncertainty: 15.0
//!   peak_estimator:
//!     kind: Mode
//!   reject_events_with_bad_hits: false
//! ```
//!
//! Run files are looked up as `data_path/run_<number>.tdc`; runs which do not exist are
//! skipped with a log message.
//!
//! ### Channel Map Format
//!
//! Each board has a mapping table of one header line followed by one record per channel,
//! in channel order:
//!
//! ```csv
//! index,display name,port,vhdl name
//! ```
//!
//! The discriminator and station of a channel are fixed by its index.
//!
//! ### Delay Table Format
//!
//! Each board has a delay table of one line per channel, in channel order, with the delay
//! in hexadecimal ticks:
//!
//! ```text
//! 0:f64
//! 1:f6a
//! ```
//!
//! ## Output
//!
//! For every board a new delay table `time_<board>_<tag>.txt` is written to the output
//! path, along with a YAML report `timecal_<tag>.yml` holding the trigger counts, the
//! data quality summary, every extracted peak, the old and new delays and the channel map.
//! A log file is also written by the application; it lists every unusable hit that was
//! skipped.
pub mod accumulator;
pub mod channel_entry;
pub mod channel_map;
pub mod config;
pub mod constants;
pub mod delay;
pub mod error;
pub mod event;
pub mod event_file;
pub mod histogram;
pub mod peak;
pub mod process;
pub mod report;
pub mod time_store;
pub mod worker_status;
