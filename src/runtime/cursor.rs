//! Sample cursors over captured channels
//!
//! - [`SampleCursor`] is the contract every decoder is written against:
//!   move forward edge by edge or to an absolute position, read the level
//!   there, and ask whether transitions remain.
//!
//! - [`ChannelCursor`] implements it over a finished [`ChannelData`]. It
//!   never blocks: running past the last transition yields
//!   [`WorkError::EndOfData`] instead of waiting for more capture.

use std::sync::Arc;

use super::errors::{WorkError, WorkResult};
use super::sample::{BitLevel, Capture, ChannelData, ChannelId, SampleIndex};

/// Forward-only view of one logic channel
pub trait SampleCursor {
    /// Current position on the capture timeline.
    fn sample_index(&self) -> SampleIndex;

    /// Level at the current position.
    fn bit_level(&self) -> BitLevel;

    /// Move to the next transition and return its position.
    fn advance_to_next_edge(&mut self) -> WorkResult<SampleIndex>;

    /// Move to `position`, which must not lie behind the current position.
    fn advance_to_abs_position(&mut self, position: SampleIndex) -> WorkResult<()>;

    /// Whether any transition exists after the current position.
    fn has_more_transitions(&self) -> bool;

    /// Whether advancing to `position` would cross at least one transition.
    fn would_advancing_to_abs_position_cause_transition(&self, position: SampleIndex) -> bool;
}

/// Cursor over one channel of a finished capture.
#[derive(Clone, Debug)]
pub struct ChannelCursor {
    id: ChannelId,
    data: Arc<ChannelData>,
    position: SampleIndex,
    /// Index of the first edge strictly after `position`
    next_edge: usize,
    level: BitLevel,
}

impl ChannelCursor {
    pub fn new(id: ChannelId, data: Arc<ChannelData>) -> Self {
        let level = data.initial_level();
        Self {
            id,
            data,
            position: 0,
            next_edge: 0,
            level,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.id
    }
}

impl SampleCursor for ChannelCursor {
    fn sample_index(&self) -> SampleIndex {
        self.position
    }

    fn bit_level(&self) -> BitLevel {
        self.level
    }

    fn advance_to_next_edge(&mut self) -> WorkResult<SampleIndex> {
        match self.data.edges().get(self.next_edge) {
            Some(&edge) => {
                self.position = edge;
                self.next_edge += 1;
                self.level = !self.level;
                Ok(edge)
            }
            None => {
                tracing::trace!("[{}] no edge after {}", self.id, self.position);
                Err(WorkError::EndOfData)
            }
        }
    }

    fn advance_to_abs_position(&mut self, position: SampleIndex) -> WorkResult<()> {
        if position < self.position {
            return Err(WorkError::InvalidState(format!(
                "[{}] cursor cannot move backwards ({} -> {})",
                self.id, self.position, position
            )));
        }
        if position >= self.data.num_samples() {
            tracing::trace!(
                "[{}] position {} beyond capture of {} samples",
                self.id,
                position,
                self.data.num_samples()
            );
            return Err(WorkError::EndOfData);
        }

        let remaining = &self.data.edges()[self.next_edge..];
        let crossed = remaining.partition_point(|&e| e <= position);
        if crossed % 2 == 1 {
            self.level = !self.level;
        }
        self.next_edge += crossed;
        self.position = position;
        Ok(())
    }

    fn has_more_transitions(&self) -> bool {
        self.next_edge < self.data.edges().len()
    }

    fn would_advancing_to_abs_position_cause_transition(&self, position: SampleIndex) -> bool {
        self.data
            .edges()
            .get(self.next_edge)
            .is_some_and(|&edge| edge <= position)
    }
}

impl Capture {
    /// Open a fresh cursor at sample 0 of channel `id`.
    pub fn cursor(&self, id: ChannelId) -> crate::Result<ChannelCursor> {
        Ok(ChannelCursor::new(id, self.channel(id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(initial: BitLevel, edges: Vec<u64>, len: u64) -> ChannelCursor {
        ChannelCursor::new(
            ChannelId(0),
            Arc::new(ChannelData::new(initial, edges, len).unwrap()),
        )
    }

    #[test]
    fn test_advance_to_next_edge_toggles_level() {
        let mut c = cursor(BitLevel::Low, vec![2, 5], 10);
        assert_eq!(c.bit_level(), BitLevel::Low);
        assert_eq!(c.advance_to_next_edge(), Ok(2));
        assert_eq!(c.bit_level(), BitLevel::High);
        assert_eq!(c.advance_to_next_edge(), Ok(5));
        assert_eq!(c.bit_level(), BitLevel::Low);
        assert!(!c.has_more_transitions());
        assert_eq!(c.advance_to_next_edge(), Err(WorkError::EndOfData));
    }

    #[test]
    fn test_advance_to_abs_position_crosses_edges() {
        let mut c = cursor(BitLevel::High, vec![2, 5, 8], 10);
        c.advance_to_abs_position(5).unwrap();
        assert_eq!(c.sample_index(), 5);
        assert_eq!(c.bit_level(), BitLevel::High);
        assert!(c.has_more_transitions());
        assert_eq!(c.advance_to_next_edge(), Ok(8));
        assert_eq!(c.bit_level(), BitLevel::Low);
    }

    #[test]
    fn test_advance_backwards_is_invalid() {
        let mut c = cursor(BitLevel::Low, vec![2], 10);
        c.advance_to_abs_position(4).unwrap();
        assert!(matches!(
            c.advance_to_abs_position(3),
            Err(WorkError::InvalidState(_))
        ));
    }

    #[test]
    fn test_advance_past_capture_is_end_of_data() {
        let mut c = cursor(BitLevel::Low, vec![2], 10);
        assert_eq!(c.advance_to_abs_position(10), Err(WorkError::EndOfData));
    }

    #[test]
    fn test_would_cause_transition() {
        let mut c = cursor(BitLevel::Low, vec![4], 10);
        assert!(!c.would_advancing_to_abs_position_cause_transition(3));
        assert!(c.would_advancing_to_abs_position_cause_transition(4));
        c.advance_to_abs_position(4).unwrap();
        assert!(!c.would_advancing_to_abs_position_cause_transition(9));
    }
}
