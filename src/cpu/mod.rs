//! Hardware CPU sampling through perf_event.

pub mod perf;
pub mod record;
pub mod ring;

pub use perf::{PollStats, RingReader, SampledEvent, SamplingSession, SessionConfig};
pub use record::{RecordHeader, Sample};
pub use ring::{CyclicBuffer, Decode};
