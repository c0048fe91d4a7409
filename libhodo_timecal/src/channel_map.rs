// Each board has its own mapping table, one record per TDC channel:
// channel,name,port,vhdl
// The records must be in channel order; a record whose index does not match its position
// means the table was edited by hand and everything downstream would be mislabeled, so we
// refuse to build the map.
use std::path::Path;

use fxhash::FxHashMap;

use super::channel_entry::ChannelEntry;
use super::config::BoardInfo;
use super::constants::{SENTINEL_CHANNEL_A, SENTINEL_CHANNEL_B};
use super::error::ChannelMapError;

const ENTRIES_PER_LINE: usize = 4; //Number of elements in a single row of a mapping table

/// Channel 64 and 65 carry the G port and are never counted as hits
pub fn is_sentinel_channel(channel: usize) -> bool {
    channel == SENTINEL_CHANNEL_A || channel == SENTINEL_CHANNEL_B
}

/// ChannelMap holds the [`ChannelEntry`] of every (board, channel) pair.
///
/// It is built once before any event is read and is read-only afterwards, so it can be
/// shared between workers.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    boards: Vec<Vec<ChannelEntry>>,
    board_lookup: FxHashMap<u32, usize>,
    n_channels: usize,
}

impl ChannelMap {
    /// Create a new ChannelMap by reading the mapping table of every board
    pub fn new(boards: &[BoardInfo], n_channels: usize) -> Result<Self, ChannelMapError> {
        let mut sources: Vec<String> = Vec::with_capacity(boards.len());
        for board in boards {
            sources.push(read_source(&board.mapping_path)?);
        }
        Self::from_sources(boards, n_channels, &sources)
    }

    /// Create a new ChannelMap from the text of each board's mapping table
    pub fn from_sources(
        boards: &[BoardInfo],
        n_channels: usize,
        sources: &[String],
    ) -> Result<Self, ChannelMapError> {
        if sources.len() != boards.len() {
            return Err(ChannelMapError::SourceCount {
                found: sources.len(),
                expected: boards.len(),
            });
        }

        let mut map = ChannelMap {
            n_channels,
            ..Default::default()
        };
        for (board_idx, (board, contents)) in boards.iter().zip(sources.iter()).enumerate() {
            let raw_id = board
                .raw_id()
                .ok_or_else(|| ChannelMapError::BadBoardId(board.id.clone()))?;
            if let Some(first) = map.board_lookup.insert(raw_id, board_idx) {
                return Err(ChannelMapError::DuplicateBoardId {
                    id: board.id.clone(),
                    first,
                    second: board_idx,
                });
            }
            map.boards
                .push(parse_board(board_idx, &board.id, n_channels, contents)?);
        }

        Ok(map)
    }

    /// Get the entry of a channel. None if the indices are outside the map
    pub fn get_entry(&self, board: usize, channel: usize) -> Option<&ChannelEntry> {
        self.boards.get(board)?.get(channel)
    }

    /// Resolve a raw board id from the data stream to a board index
    pub fn resolve_board(&self, board_id_raw: u32) -> Option<usize> {
        self.board_lookup.get(&board_id_raw).copied()
    }

    /// Resolve a raw channel id to a channel index
    pub fn resolve_channel(&self, channel_id_raw: u32) -> Option<usize> {
        let channel = channel_id_raw as usize;
        if channel < self.n_channels {
            Some(channel)
        } else {
            None
        }
    }

    pub fn n_boards(&self) -> usize {
        self.boards.len()
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Iterate over (board index, entry) for every channel in board then channel order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChannelEntry)> {
        self.boards
            .iter()
            .enumerate()
            .flat_map(|(board, entries)| entries.iter().map(move |entry| (board, entry)))
    }
}

fn read_source(path: &Path) -> Result<String, ChannelMapError> {
    std::fs::read_to_string(path).map_err(|e| ChannelMapError::IOError(e, path.to_path_buf()))
}

/// Parse one board's table. The first line is a header
fn parse_board(
    board: usize,
    board_id: &str,
    n_channels: usize,
    contents: &str,
) -> Result<Vec<ChannelEntry>, ChannelMapError> {
    let mut entries: Vec<ChannelEntry> = Vec::with_capacity(n_channels);
    let mut lines = contents.lines();
    lines.next(); // Skip the header
    for (position, line) in lines.take(n_channels).enumerate() {
        let file_line = position + 2;
        let fields: Vec<&str> = line.split_terminator(',').map(str::trim).collect();
        if fields.len() < ENTRIES_PER_LINE {
            return Err(ChannelMapError::BadFileFormat {
                board,
                line: file_line,
            });
        }

        let found: usize = fields[0]
            .parse()
            .map_err(|source| ChannelMapError::ParsingError {
                board,
                line: file_line,
                source,
            })?;
        if found != position {
            return Err(ChannelMapError::IndexMismatch {
                board,
                position,
                found,
            });
        }

        entries.push(ChannelEntry::new(
            position, board_id, fields[1], fields[2], fields[3],
        ));
    }

    if entries.len() < n_channels {
        return Err(ChannelMapError::MissingRecords {
            board,
            found: entries.len(),
            expected: n_channels,
        });
    }
    Ok(entries)
}
