use serde::Serialize;

use super::constants::{DISCRIMINATOR_NAMES, NOT_HODO_DISCRIMINATOR, NUMBER_OF_HODO_STATIONS};

/// Discriminator and station for a channel index within a board.
///
/// The wiring is identical on every board: two ST4 halves, then ST2, ST3, two
/// not-hodoscope channels (64: station 5, 65: station 6), ST1, and spare channels (station 7).
pub fn discriminator_and_station(channel: usize) -> (u8, u8) {
    match channel {
        0..=15 => (3, 4),
        16..=31 => (4, 4),
        32..=47 => (1, 2),
        48..=63 => (2, 3),
        64 => (NOT_HODO_DISCRIMINATOR, 5),
        65 => (NOT_HODO_DISCRIMINATOR, 6),
        66..=79 => (0, 1),
        _ => (NOT_HODO_DISCRIMINATOR, 7),
    }
}

/// Everything known about one physical TDC channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEntry {
    pub channel_id: usize,
    pub board_id: String,
    pub discriminator_id: u8,
    pub station_id: u8,
    pub port_name: String,
    pub vhdl_name: String,
    pub display_name: String,
}

impl ChannelEntry {
    pub fn new(
        channel_id: usize,
        board_id: &str,
        display_name: &str,
        port_name: &str,
        vhdl_name: &str,
    ) -> Self {
        let (discriminator_id, station_id) = discriminator_and_station(channel_id);
        Self {
            channel_id,
            board_id: board_id.to_string(),
            discriminator_id,
            station_id,
            port_name: port_name.to_string(),
            vhdl_name: vhdl_name.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Channel is fed by a hodoscope discriminator
    pub fn is_hodoscope(&self) -> bool {
        self.discriminator_id < NOT_HODO_DISCRIMINATOR
    }

    pub fn discriminator_name(&self) -> &'static str {
        DISCRIMINATOR_NAMES
            .get(self.discriminator_id as usize)
            .copied()
            .unwrap_or("NotHodo")
    }

    /// Zero based hodoscope station index, None for the not-hodoscope stations
    pub fn station_index(&self) -> Option<usize> {
        let idx = (self.station_id as usize).checked_sub(1)?;
        if idx < NUMBER_OF_HODO_STATIONS {
            Some(idx)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piecewise_rule() {
        assert_eq!(discriminator_and_station(0), (3, 4));
        assert_eq!(discriminator_and_station(15), (3, 4));
        assert_eq!(discriminator_and_station(16), (4, 4));
        assert_eq!(discriminator_and_station(40), (1, 2));
        assert_eq!(discriminator_and_station(63), (2, 3));
        assert_eq!(discriminator_and_station(64), (5, 5));
        assert_eq!(discriminator_and_station(65), (5, 6));
        assert_eq!(discriminator_and_station(66), (0, 1));
        assert_eq!(discriminator_and_station(70), (0, 1));
        assert_eq!(discriminator_and_station(79), (0, 1));
        assert_eq!(discriminator_and_station(80), (5, 7));
        assert_eq!(discriminator_and_station(95), (5, 7));
    }

    #[test]
    fn test_station_index() {
        let st1 = ChannelEntry::new(70, "420", "H1T5", "A", "a_70");
        assert_eq!(st1.station_index(), Some(0));
        assert!(st1.is_hodoscope());
        assert_eq!(st1.discriminator_name(), "ST1");
        let g_port = ChannelEntry::new(64, "420", "G1", "G", "g_0");
        assert_eq!(g_port.station_index(), None);
        assert!(!g_port.is_hodoscope());
        assert_eq!(g_port.discriminator_name(), "NotHodo");
        assert_eq!(ChannelEntry::new(20, "420", "H4B5", "A", "a_20").discriminator_name(), "ST4b");
    }
}
