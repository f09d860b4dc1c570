//! Records produced by the kernel into the perf ring.

use super::ring::{Decode, ne_u16, ne_u32, ne_u64};

// Record types (from linux/perf_event.h)
pub const PERF_RECORD_LOST: u32 = 2;
pub const PERF_RECORD_SAMPLE: u32 = 9;

/// perf_event_header preceding every record in the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: u32,
    pub misc: u16,
    /// Size of the whole record, header included
    pub size: u16,
}

impl RecordHeader {
    pub fn is_sample(&self) -> bool {
        self.kind == PERF_RECORD_SAMPLE
    }

    /// Bytes following the header
    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(Self::SIZE)
    }
}

impl Decode for RecordHeader {
    const SIZE: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        RecordHeader {
            kind: ne_u32(bytes, 0),
            misc: ne_u16(bytes, 4),
            size: ne_u16(bytes, 6),
        }
    }
}

/// One sampled instruction pointer.
///
/// Layout follows `PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_TIME |
/// PERF_SAMPLE_CPU`: ip, pid, tid, time, cpu, reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub ip: u64,
    pub pid: u32,
    pub tid: u32,
    pub time: u64,
    pub cpu: u32,
}

impl Decode for Sample {
    const SIZE: usize = 32;

    fn decode(bytes: &[u8]) -> Self {
        Sample {
            ip: ne_u64(bytes, 0),
            pid: ne_u32(bytes, 8),
            tid: ne_u32(bytes, 12),
            time: ne_u64(bytes, 16),
            cpu: ne_u32(bytes, 24),
        }
    }
}

/// Record size the kernel emits for a [`Sample`]
pub const SAMPLE_RECORD_SIZE: usize = RecordHeader::SIZE + Sample::SIZE;
