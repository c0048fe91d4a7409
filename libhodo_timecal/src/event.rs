use super::error::EventError;

/// One raw TDC hit as it comes out of the event store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawHit {
    pub board_id_raw: u32,
    pub channel_id_raw: u32,
    pub tdc_time: u32,
    pub trigger_time: u32,
}

/// One decoded event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    pub event_id: u32,
    pub event_type: u32,
    pub trigger_bitmask: u32,
    pub hits: Vec<RawHit>,
}

impl RawEvent {
    pub fn new(event_id: u32, event_type: u32, trigger_bitmask: u32, hits: Vec<RawHit>) -> Self {
        Self {
            event_id,
            event_type,
            trigger_bitmask,
            hits,
        }
    }

    /// Build an event from the parallel column layout used by the event store.
    ///
    /// Every column must have at least `hit_count` entries; anything past `hit_count` is ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        event_id: u32,
        event_type: u32,
        trigger_bitmask: u32,
        hit_count: usize,
        board_id: &[u32],
        channel_id: &[u32],
        tdc_time: &[u32],
        trigger_time: &[u32],
    ) -> Result<Self, EventError> {
        let columns: [(&'static str, &[u32]); 4] = [
            ("boardID", board_id),
            ("channelID", channel_id),
            ("tdcTime", tdc_time),
            ("triggerTime", trigger_time),
        ];
        for (column, values) in columns {
            if values.len() < hit_count {
                return Err(EventError::ShortColumns {
                    event_id,
                    hit_count,
                    column,
                    length: values.len(),
                });
            }
        }

        let hits = (0..hit_count)
            .map(|idx| RawHit {
                board_id_raw: board_id[idx],
                channel_id_raw: channel_id[idx],
                tdc_time: tdc_time[idx],
                trigger_time: trigger_time[idx],
            })
            .collect();

        Ok(Self::new(event_id, event_type, trigger_bitmask, hits))
    }

    /// Trigger kinds fired in this event, lowest bit first
    pub fn fired_triggers(&self, n_triggers: usize) -> impl Iterator<Item = usize> + '_ {
        use bitvec::prelude::*;
        self.trigger_bitmask
            .view_bits::<Lsb0>()
            .iter_ones()
            .take_while(move |bit| *bit < n_triggers)
    }
}

/// Anything that yields events in file order
pub trait EventSource {
    type Error;

    /// The next event, or None when the source is exhausted
    fn next_event(&mut self) -> Result<Option<RawEvent>, Self::Error>;
}

/// In-memory event source, mostly for replaying a selection of events
#[derive(Debug, Clone, Default)]
pub struct VecEventSource {
    events: std::collections::VecDeque<RawEvent>,
}

impl VecEventSource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl EventSource for VecEventSource {
    type Error = std::convert::Infallible;

    fn next_event(&mut self) -> Result<Option<RawEvent>, Self::Error> {
        Ok(self.events.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns() {
        let event =
            RawEvent::from_columns(3, 14, 0b100000, 2, &[0x420, 0x430, 0], &[1, 2, 0], &[600, 601, 0], &[0, 0, 0])
                .unwrap();
        assert_eq!(event.hits.len(), 2);
        assert_eq!(event.hits[1].board_id_raw, 0x430);
        assert_eq!(event.hits[1].tdc_time, 601);
    }

    #[test]
    fn test_short_columns() {
        let result = RawEvent::from_columns(3, 14, 1, 3, &[1, 2, 3], &[1, 2], &[1, 2, 3], &[1, 2, 3]);
        assert!(matches!(
            result,
            Err(EventError::ShortColumns {
                column: "channelID",
                length: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_fired_triggers() {
        let event = RawEvent::new(0, 14, (1 << 5) | (1 << 8) | (1 << 20), vec![]);
        let fired: Vec<usize> = event.fired_triggers(12).collect();
        assert_eq!(fired, vec![5, 8]);

        let none = RawEvent::new(0, 14, 0, vec![]);
        assert_eq!(none.fired_triggers(12).count(), 0);

        let all = RawEvent::new(0, 14, u32::MAX, vec![]);
        assert_eq!(all.fired_triggers(32).count(), 32);
        assert_eq!(all.fired_triggers(3).collect::<Vec<usize>>(), vec![0, 1, 2]);
    }
}
