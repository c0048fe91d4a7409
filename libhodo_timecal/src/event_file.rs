use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use super::constants::MAX_HITS_PER_EVENT;
use super::error::EventFileError;
use super::event::{EventSource, RawEvent};

// Record layout, all little endian u32:
// event_id, event_type, trigger_type, n_hits,
// boardID[n_hits], channelID[n_hits], tdcTime[n_hits], triggerTime[n_hits]
const HEADER_WORDS: usize = 4;
const COLUMNS: usize = 4;
const WORD_SIZE: usize = 4;

/// Reads events from any byte stream in the run file layout
#[derive(Debug)]
pub struct EventReader<R: Read> {
    reader: R,
    events_read: u64,
    bytes_read: u64,
    column_buffer: Vec<u32>,
}

impl<R: Read> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            events_read: 0,
            bytes_read: 0,
            column_buffer: Vec::new(),
        }
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Get the next event. Returns Ok(None) at a clean end of stream; a record cut short is an error
    pub fn get_next_event(&mut self) -> Result<Option<RawEvent>, EventFileError> {
        let event_id = match self.reader.read_u32::<LittleEndian>() {
            Ok(id) => id,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(EventFileError::IOError(e)),
        };
        let event_type = self.reader.read_u32::<LittleEndian>()?;
        let trigger_bitmask = self.reader.read_u32::<LittleEndian>()?;
        let n_hits = self.reader.read_u32::<LittleEndian>()? as usize;
        if n_hits > MAX_HITS_PER_EVENT {
            return Err(EventFileError::TooManyHits {
                event_id,
                n_hits,
                max: MAX_HITS_PER_EVENT,
            });
        }

        self.column_buffer.resize(n_hits * COLUMNS, 0);
        self.reader
            .read_u32_into::<LittleEndian>(&mut self.column_buffer)?;
        let (board_id, rest) = self.column_buffer.split_at(n_hits);
        let (channel_id, rest) = rest.split_at(n_hits);
        let (tdc_time, trigger_time) = rest.split_at(n_hits);

        let event = RawEvent::from_columns(
            event_id,
            event_type,
            trigger_bitmask,
            n_hits,
            board_id,
            channel_id,
            tdc_time,
            trigger_time,
        )?;
        self.events_read += 1;
        self.bytes_read += (WORD_SIZE * (HEADER_WORDS + n_hits * COLUMNS)) as u64;
        Ok(Some(event))
    }
}

impl<R: Read> EventSource for EventReader<R> {
    type Error = EventFileError;

    fn next_event(&mut self) -> Result<Option<RawEvent>, Self::Error> {
        self.get_next_event()
    }
}

/// A run file on disk
pub type EventFile = EventReader<BufReader<File>>;

impl EventFile {
    /// Open a run file for reading
    pub fn open(path: &Path) -> Result<Self, EventFileError> {
        if !path.exists() {
            return Err(EventFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(EventReader::new(BufReader::new(file)))
    }
}

/// Writes events in the run file layout
#[derive(Debug)]
pub struct EventWriter<W: Write> {
    writer: W,
}

impl<W: Write> EventWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_event(&mut self, event: &RawEvent) -> Result<(), EventFileError> {
        let mut header = [0u32; HEADER_WORDS];
        header[0] = event.event_id;
        header[1] = event.event_type;
        header[2] = event.trigger_bitmask;
        header[3] = event.hits.len() as u32;
        for word in header {
            self.writer.write_u32::<LittleEndian>(word)?;
        }
        for hit in event.hits.iter() {
            self.writer.write_u32::<LittleEndian>(hit.board_id_raw)?;
        }
        for hit in event.hits.iter() {
            self.writer.write_u32::<LittleEndian>(hit.channel_id_raw)?;
        }
        for hit in event.hits.iter() {
            self.writer.write_u32::<LittleEndian>(hit.tdc_time)?;
        }
        for hit in event.hits.iter() {
            self.writer.write_u32::<LittleEndian>(hit.trigger_time)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), EventFileError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl EventWriter<BufWriter<File>> {
    /// Create (or truncate) a run file for writing
    pub fn create(path: &Path) -> Result<Self, EventFileError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawHit;
    use std::io::Cursor;

    fn hit(board: u32, channel: u32, tdc: u32) -> RawHit {
        RawHit {
            board_id_raw: board,
            channel_id_raw: channel,
            tdc_time: tdc,
            trigger_time: 7,
        }
    }

    fn encode(events: &[RawEvent]) -> Vec<u8> {
        let mut writer = EventWriter::new(Vec::new());
        for event in events {
            writer.write_event(event).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_read_stream() {
        let events = vec![
            RawEvent::new(1, 14, 1 << 5, vec![hit(0x420, 3, 600), hit(0x430, 70, 610)]),
            RawEvent::new(2, 10, 0, vec![]),
        ];
        let mut reader = EventReader::new(Cursor::new(encode(&events)));
        assert_eq!(reader.get_next_event().unwrap(), Some(events[0].clone()));
        assert_eq!(reader.get_next_event().unwrap(), Some(events[1].clone()));
        assert_eq!(reader.get_next_event().unwrap(), None);
        assert_eq!(reader.events_read(), 2);
        assert_eq!(reader.bytes_read(), (16 + 2 * 16 + 16) as u64);
    }

    #[test]
    fn test_truncated_record() {
        let events = vec![RawEvent::new(1, 14, 1, vec![hit(0x420, 3, 600)])];
        let mut bytes = encode(&events);
        bytes.truncate(bytes.len() - 2);
        let mut reader = EventReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.get_next_event(),
            Err(EventFileError::IOError(_))
        ));
    }

    #[test]
    fn test_corrupt_hit_count() {
        let mut bytes = Vec::new();
        for word in [1u32, 14, 32, 0xFFFF_FFFF] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let mut reader = EventReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.get_next_event(),
            Err(EventFileError::TooManyHits {
                event_id: 1,
                n_hits: 0xFFFF_FFFF,
                ..
            })
        ));

        let full = vec![hit(0x420, 3, 600); MAX_HITS_PER_EVENT];
        let bytes = encode(&[RawEvent::new(2, 14, 32, full)]);
        let mut reader = EventReader::new(Cursor::new(bytes));
        let event = reader.get_next_event().unwrap().unwrap();
        assert_eq!(event.hits.len(), MAX_HITS_PER_EVENT);
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/this/run/does/not/exist.tdc");
        assert!(matches!(
            EventFile::open(path),
            Err(EventFileError::BadFilePath(_))
        ));
    }
}
