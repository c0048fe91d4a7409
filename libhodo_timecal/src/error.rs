use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum ChannelMapError {
    #[error("ChannelMap failed due to IO error on {1:?}: {0}")]
    IOError(std::io::Error, PathBuf),
    #[error("ChannelMap failed to parse a channel index on board {board} line {line}: {source}")]
    ParsingError {
        board: usize,
        line: usize,
        source: std::num::ParseIntError,
    },
    #[error("ChannelMap was given a record with too few columns on board {board} line {line}; expected index,name,port,vhdl")]
    BadFileFormat { board: usize, line: usize },
    #[error("ChannelMap is inconsistent -- board {board} record {position} claims channel {found}")]
    IndexMismatch {
        board: usize,
        position: usize,
        found: usize,
    },
    #[error("ChannelMap for board {board} has {found} records; expected {expected}")]
    MissingRecords {
        board: usize,
        found: usize,
        expected: usize,
    },
    #[error("ChannelMap was given {found} mapping sources for {expected} boards")]
    SourceCount { found: usize, expected: usize },
    #[error("ChannelMap found an invalid hex board id: {0}")]
    BadBoardId(String),
    #[error("ChannelMap board {second} reuses the id {id} of board {first}")]
    DuplicateBoardId {
        id: String,
        first: usize,
        second: usize,
    },
}

#[derive(Debug, Error)]
pub enum DelayTableError {
    #[error("DelayTable failed due to IO error on {1:?}: {0}")]
    IOError(std::io::Error, PathBuf),
    #[error("DelayTable has a malformed entry on board {board} line {line}: {text:?}")]
    BadLine {
        board: usize,
        line: usize,
        text: String,
    },
    #[error("DelayTable entry on board {board} line {line} claims channel {found}")]
    IndexMismatch {
        board: usize,
        line: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum DelayError {
    #[error("No previous delay for board {board} channel {channel}; the delay table is truncated")]
    MissingDelay { board: usize, channel: usize },
    #[error("Computed a negative delay {delay} for board {board} channel {channel}")]
    NegativeDelay {
        board: usize,
        channel: usize,
        delay: i64,
    },
    #[error("Delay table for board {board} has {found} entries; the board has {expected} channels")]
    ExtraDelays {
        board: usize,
        found: usize,
        expected: usize,
    },
    #[error("Expected {expected} delay tables, found {found}")]
    TableCount { found: usize, expected: usize },
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event {event_id} declares {hit_count} hits but column {column} only has {length} entries")]
    ShortColumns {
        event_id: u32,
        hit_count: usize,
        column: &'static str,
        length: usize,
    },
}

#[derive(Debug, Error)]
pub enum EventFileError {
    #[error("Could not open EventFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("EventFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EventFile contained a bad event: {0}")]
    BadEvent(#[from] EventError),
    #[error("EventFile record for event {event_id} declares {n_hits} hits; at most {max} are allowed")]
    TooManyHits {
        event_id: u32,
        n_hits: usize,
        max: usize,
    },
}

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("Cannot merge histograms with different binning: {0}")]
    BinningMismatch(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Report failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Report failed to format a timestamp: {0}")]
    TimeError(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to ChannelMap error: {0}")]
    MapError(#[from] ChannelMapError),
    #[error("Processor failed due to DelayTable error: {0}")]
    DelayTableError(#[from] DelayTableError),
    #[error("Processor failed due to delay correction error: {0}")]
    DelayError(#[from] DelayError),
    #[error("Processor failed due to EventFile error: {0}")]
    EventFileError(#[from] EventFileError),
    #[error("Processor failed due to Histogram error: {0}")]
    HistogramError(#[from] HistogramError),
    #[error("Processor failed due to Report error: {0}")]
    ReportError(#[from] ReportError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed to join worker {0}")]
    JoinError(usize),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
