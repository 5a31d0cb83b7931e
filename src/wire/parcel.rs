//! Parcel and header types.

use std::cmp::Ordering;

/// Fixed 8-byte magic marker, identical across protocol versions.
pub const MAGIC: [u8; 8] = *b"JNET\x01\x00\x00\x01";

/// Coarse classification of a parcel's purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    Signal = 0,
    Object = 1,
    File = 2,
}

impl Channel {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Channel::Signal),
            1 => Some(Channel::Object),
            2 => Some(Channel::File),
            _ => None,
        }
    }
}

/// Scheduling priority class. Ordinal order is BOTTOM < LOW < NORMAL <
/// HIGH < TOP; higher ordinal is scheduled first (see [`Priority::rank`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Bottom = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Top = 4,
}

impl Priority {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Priority::Bottom),
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            4 => Some(Priority::Top),
            _ => None,
        }
    }

    /// A priority level strictly above TOP, used for unbound signals so a
    /// lone signal preempts any data parcel currently queued.
    pub const SIGNAL_RANK: u8 = 5;

    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Present only on parcel sequence 0 of a non-signal object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Total length of the object's full serialisation, in bytes.
    pub total_length: u64,
    /// Total number of parcels this object will be split into.
    pub parcel_count: u32,
    /// Serialisation method id the payload was encoded with.
    pub method_id: u32,
    /// CRC32 of the complete serialisation.
    pub crc32: u32,
    /// Remote path, set only for file transfers.
    pub remote_path: Option<String>,
}

/// The atomic wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parcel {
    pub channel: Channel,
    pub priority: Priority,
    pub object_id: u64,
    pub sequence: u32,
    pub header: Option<ObjectHeader>,
    pub payload: Vec<u8>,
}

impl Parcel {
    pub fn signal(priority: Priority, object_id: u64, payload: Vec<u8>) -> Self {
        Parcel {
            channel: Channel::Signal,
            priority,
            object_id,
            sequence: 0,
            header: None,
            payload,
        }
    }

    pub fn data(
        channel: Channel,
        priority: Priority,
        object_id: u64,
        sequence: u32,
        header: Option<ObjectHeader>,
        payload: Vec<u8>,
    ) -> Self {
        Parcel {
            channel,
            priority,
            object_id,
            sequence,
            header,
            payload,
        }
    }

    /// Scheduling key used by the priority send queue: `(priority rank
    /// descending via Reverse at the call site, object-id ascending,
    /// sequence ascending)`. Unbound signals use [`Priority::SIGNAL_RANK`]
    /// by being wrapped in [`ScheduleKey::signal_rank`] rather than by
    /// mutating the parcel's own priority field.
    pub fn schedule_key(&self) -> ScheduleKey {
        ScheduleKey {
            rank: self.priority.rank(),
            object_id: self.object_id,
            sequence: self.sequence,
        }
    }
}

/// Total order used by the priority send queue. Constructed from a
/// parcel's `(priority, object_id, sequence)` tuple, optionally with an
/// elevated rank for unbound signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleKey {
    pub rank: u8,
    pub object_id: u64,
    pub sequence: u32,
}

impl ScheduleKey {
    pub fn unbound_signal() -> Self {
        ScheduleKey {
            rank: Priority::SIGNAL_RANK,
            object_id: 0,
            sequence: 0,
        }
    }
}

impl PartialOrd for ScheduleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher rank first, then lower object-id first, then lower
        // sequence first. `BinaryHeap` is a max-heap so this Ord must
        // already express "goes out sooner is greater".
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.object_id.cmp(&self.object_id))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ranks_ascend_toward_top() {
        assert!(Priority::Top.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());
        assert!(Priority::Low.rank() > Priority::Bottom.rank());
    }

    #[test]
    fn schedule_key_orders_priority_then_object_then_sequence() {
        let high = ScheduleKey {
            rank: Priority::High.rank(),
            object_id: 5,
            sequence: 0,
        };
        let low = ScheduleKey {
            rank: Priority::Low.rank(),
            object_id: 1,
            sequence: 0,
        };
        assert!(high > low, "higher priority must sort ahead of lower");

        let earlier_object = ScheduleKey {
            rank: Priority::Normal.rank(),
            object_id: 1,
            sequence: 0,
        };
        let later_object = ScheduleKey {
            rank: Priority::Normal.rank(),
            object_id: 2,
            sequence: 0,
        };
        assert!(earlier_object > later_object, "lower object-id sent first");

        let seq0 = ScheduleKey {
            rank: Priority::Normal.rank(),
            object_id: 1,
            sequence: 0,
        };
        let seq1 = ScheduleKey {
            rank: Priority::Normal.rank(),
            object_id: 1,
            sequence: 1,
        };
        assert!(seq0 > seq1, "lower sequence sent first");
    }

    #[test]
    fn signal_rank_preempts_top() {
        let signal = ScheduleKey::unbound_signal();
        let top = ScheduleKey {
            rank: Priority::Top.rank(),
            object_id: 0,
            sequence: 0,
        };
        assert!(signal > top);
    }
}
