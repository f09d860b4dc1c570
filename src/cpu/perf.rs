use super::record::{RecordHeader, SAMPLE_RECORD_SIZE, Sample};
use super::ring::{CyclicBuffer, Decode};
use crate::error::{Error, Result};
use libc::{self, SYS_perf_event_open, c_int, c_ulong, pid_t, syscall};
use memmap2::{MmapOptions, MmapRaw};
use std::fs;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};
use std::sync::atomic::{self, AtomicU64, Ordering};

// perf_event constants (from linux/perf_event.h)
pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_COUNT_HW_CPU_CYCLES: u64 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u64 = 1;

pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_TIME: u64 = 1 << 2;
pub const PERF_SAMPLE_CPU: u64 = 1 << 7;

pub const PERF_FLAG_FD_CLOEXEC: c_ulong = 1 << 3;

const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
const PERF_EVENT_IOC_RESET: u64 = 0x2403;

/// Fields captured with every sample; must match [`Sample`]'s layout
pub const SAMPLE_TYPE: u64 = PERF_SAMPLE_IP | PERF_SAMPLE_TID | PERF_SAMPLE_TIME | PERF_SAMPLE_CPU;

/// perf_event_attr structure
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
}

impl PerfEventAttr {
    // Flag bit positions
    const DISABLED_BIT: u64 = 1 << 0;
    const EXCLUDE_HV_BIT: u64 = 1 << 6;
    const FREQ_BIT: u64 = 1 << 10;
    const WATERMARK_BIT: u64 = 1 << 14;

    pub fn new() -> Self {
        PerfEventAttr {
            size: std::mem::size_of::<PerfEventAttr>() as u32,
            ..Default::default()
        }
    }

    fn set_flag(&mut self, bit: u64, val: bool) {
        if val {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }

    pub fn set_disabled(&mut self, val: bool) {
        self.set_flag(Self::DISABLED_BIT, val);
    }

    pub fn set_exclude_hv(&mut self, val: bool) {
        self.set_flag(Self::EXCLUDE_HV_BIT, val);
    }

    pub fn set_freq(&mut self, val: bool) {
        self.set_flag(Self::FREQ_BIT, val);
    }

    pub fn set_watermark(&mut self, val: bool) {
        self.set_flag(Self::WATERMARK_BIT, val);
    }
}

/// perf_event_mmap_page header structure
#[repr(C)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub __reserved_1: u32,
    pub time_cycles: u64,
    pub time_mask: u64,
    pub __reserved: [u8; 928],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub aux_head: u64,
    pub aux_tail: u64,
    pub aux_offset: u64,
    pub aux_size: u64,
}

/// Hardware event driving the sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampledEvent {
    Cycles,
    Instructions,
}

impl SampledEvent {
    fn config(self) -> u64 {
        match self {
            SampledEvent::Cycles => PERF_COUNT_HW_CPU_CYCLES,
            SampledEvent::Instructions => PERF_COUNT_HW_INSTRUCTIONS,
        }
    }
}

/// What a sampling session records and where
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Logical CPU to sample
    pub cpu: usize,
    /// Target samples per second
    pub frequency: u64,
    pub event: SampledEvent,
    /// Number of data pages after the metadata page (power of two)
    pub data_pages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            cpu: 0,
            frequency: 7000,
            event: SampledEvent::Cycles,
            data_pages: 1,
        }
    }
}

impl SessionConfig {
    pub fn attr(&self, data_size: usize) -> PerfEventAttr {
        let mut attr = PerfEventAttr::new();
        attr.type_ = PERF_TYPE_HARDWARE;
        attr.config = self.event.config();
        attr.sample_type = SAMPLE_TYPE;
        attr.sample_period_or_freq = self.frequency;
        attr.set_freq(true);
        attr.set_disabled(true);
        attr.set_exclude_hv(true);
        attr.set_watermark(true);
        attr.wakeup_events_or_watermark = (data_size / 2) as u32; // Wake when half full
        attr
    }
}

/// Outcome of one drain of the ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub samples: usize,
    pub skipped: usize,
}

/// Consumer side of the perf ring: metadata page plus circular data area.
pub struct RingReader {
    meta: NonNull<PerfEventMmapPage>,
    data: CyclicBuffer,
}

impl RingReader {
    /// Attach to a ring, resuming at the tail currently published in `meta`.
    ///
    /// # Safety
    ///
    /// `meta` must point to a live `perf_event_mmap_page` and `data` to
    /// `size` readable bytes, both outliving the reader.
    pub unsafe fn new(meta: *mut PerfEventMmapPage, data: *const u8, size: usize) -> Self {
        // SAFETY: caller guarantees meta is valid
        let tail = unsafe { AtomicU64::from_ptr(ptr::addr_of_mut!((*meta).data_tail)) }
            .load(Ordering::Relaxed);
        RingReader {
            meta: NonNull::new(meta).unwrap_or(NonNull::dangling()),
            // SAFETY: forwarded from the caller
            data: unsafe { CyclicBuffer::from_raw_parts(data, size, tail) },
        }
    }

    fn data_head(&self) -> &AtomicU64 {
        // SAFETY: meta outlives self per RingReader::new, data_head is 8-aligned
        unsafe { AtomicU64::from_ptr(ptr::addr_of_mut!((*self.meta.as_ptr()).data_head)) }
    }

    fn data_tail(&self) -> &AtomicU64 {
        // SAFETY: as above
        unsafe { AtomicU64::from_ptr(ptr::addr_of_mut!((*self.meta.as_ptr()).data_tail)) }
    }

    /// Decode every record published so far, handing samples to `on_sample`.
    ///
    /// Publishes the new tail once the pass is complete.
    pub fn poll<F: FnMut(&Sample)>(&mut self, mut on_sample: F) -> Result<PollStats> {
        let head = self.data_head().load(Ordering::Acquire);
        // rmb after reading data_head, see perf_event_open(2)
        atomic::fence(Ordering::SeqCst);

        let consumed = self.data.total_read();
        if head.wrapping_sub(consumed) > self.data.capacity() as u64 {
            return Err(Error::Protocol(format!(
                "producer at {} is out of range of consumer at {} (ring of {} bytes)",
                head,
                consumed,
                self.data.capacity()
            )));
        }

        let mut stats = PollStats::default();

        while self.data.total_read() < head {
            if head - self.data.total_read() < RecordHeader::SIZE as u64 {
                return Err(Error::Protocol(format!(
                    "truncated record header at {}",
                    self.data.total_read()
                )));
            }

            let header: RecordHeader = self.data.read();
            if (header.size as usize) < RecordHeader::SIZE {
                return Err(Error::Protocol(format!(
                    "record of type {} declares {} bytes, smaller than its header",
                    header.kind, header.size
                )));
            }

            let payload = header.payload_len();
            if payload as u64 > head - self.data.total_read() {
                return Err(Error::Protocol(format!(
                    "record of type {} ({} bytes) runs past the producer position",
                    header.kind, header.size
                )));
            }

            if header.is_sample() {
                if header.size as usize != SAMPLE_RECORD_SIZE {
                    return Err(Error::Protocol(format!(
                        "sample record of {} bytes, expected {}",
                        header.size, SAMPLE_RECORD_SIZE
                    )));
                }
                let sample: Sample = self.data.read();
                on_sample(&sample);
                stats.samples += 1;
            } else {
                self.data.skip(payload);
                stats.skipped += 1;
            }
        }

        // Everything up to here has been copied out, the kernel may reuse it
        atomic::fence(Ordering::SeqCst);
        self.data_tail().store(self.data.total_read(), Ordering::Release);

        Ok(stats)
    }

    /// Logical consumer position
    pub fn position(&self) -> u64 {
        self.data.total_read()
    }
}

/// One CPU-wide hardware sampling stream and its mapped ring.
///
/// Dropping the session disables the event, unmaps the ring and closes
/// the descriptor, in that order.
pub struct SamplingSession {
    ring: RingReader,
    _mmap: MmapRaw,
    fd: OwnedFd,
}

// SAFETY: The ring pointers are only dereferenced through &mut self
unsafe impl Send for SamplingSession {}

impl SamplingSession {
    /// Open a sampling stream on `config.cpu`
    pub fn open(config: &SessionConfig) -> Result<Self> {
        check_perf_paranoid();

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let data_pages = config.data_pages.max(1);
        let mmap_size = (1 + data_pages) * page_size; // 1 metadata page + data pages

        let attr = config.attr(data_pages * page_size);

        let fd = unsafe {
            syscall(
                SYS_perf_event_open,
                &attr as *const PerfEventAttr,
                -1 as pid_t, // every process
                config.cpu as c_int,
                -1 as c_int, // no group
                PERF_FLAG_FD_CLOEXEC,
            )
        };

        if fd < 0 {
            let err = std::io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EACCES) | Some(libc::EPERM) => Error::PermissionDenied(format!(
                    "Cannot sample CPU {}. Run as root or try: sudo sysctl kernel.perf_event_paranoid=-1",
                    config.cpu
                )),
                Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::EOPNOTSUPP) => {
                    Error::PerfEvent(format!(
                        "hardware event {:?} is not available on CPU {}: {}",
                        config.event, config.cpu, err
                    ))
                }
                _ => Error::PerfEvent(format!("perf_event_open failed: {}", err)),
            });
        }

        let fd = unsafe { OwnedFd::from_raw_fd(fd as c_int) };

        let mmap = MmapOptions::new()
            .len(mmap_size)
            .map_raw(fd.as_raw_fd())
            .map_err(|e| Error::PerfEvent(format!("Failed to mmap perf buffer: {}", e)))?;

        let meta = mmap.as_mut_ptr() as *mut PerfEventMmapPage;

        // Kernels before 4.1 leave these zero and put data right after the first page
        let (data_offset, data_size) = unsafe { ((*meta).data_offset, (*meta).data_size) };
        let data_offset = if data_offset == 0 { page_size } else { data_offset as usize };
        let data_size = if data_size == 0 {
            mmap_size - page_size
        } else {
            data_size as usize
        };

        // SAFETY: both regions live inside `mmap`, which the session owns
        let ring = unsafe { RingReader::new(meta, mmap.as_ptr().add(data_offset), data_size) };

        let session = SamplingSession {
            ring,
            _mmap: mmap,
            fd,
        };

        session.ioctl(PERF_EVENT_IOC_RESET, "reset")?;
        session.ioctl(PERF_EVENT_IOC_ENABLE, "enable")?;

        log::debug!(
            "perf session on CPU {}: {:?} at {} Hz, {} byte ring",
            config.cpu,
            config.event,
            config.frequency,
            data_size
        );

        Ok(session)
    }

    fn ioctl(&self, request: u64, what: &str) -> Result<()> {
        let ret = unsafe { libc::ioctl(self.fd.as_raw_fd(), request as _, 0) };
        if ret < 0 {
            return Err(Error::PerfEvent(format!(
                "Failed to {} perf event: {}",
                what,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Drain newly published records, see [`RingReader::poll`]
    pub fn poll<F: FnMut(&Sample)>(&mut self, on_sample: F) -> Result<PollStats> {
        self.ring.poll(on_sample)
    }

    /// Descriptor that becomes readable when the kernel wakes the consumer
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for SamplingSession {
    fn drop(&mut self) {
        unsafe {
            libc::ioctl(self.fd.as_raw_fd(), PERF_EVENT_IOC_DISABLE as _, 0);
        }
    }
}

/// Warn when /proc/sys/kernel/perf_event_paranoid forbids CPU-wide sampling
fn check_perf_paranoid() {
    let path = "/proc/sys/kernel/perf_event_paranoid";
    if let Ok(content) = fs::read_to_string(path) {
        let level: i32 = content.trim().parse().unwrap_or(2);
        if level > 0 {
            log::warn!(
                "perf_event_paranoid={}, CPU-wide sampling needs root or CAP_PERFMON",
                level
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::record::{PERF_RECORD_LOST, PERF_RECORD_SAMPLE};

    /// Heap-backed stand-in for the kernel side of the mapping
    struct FakeRing {
        meta: *mut PerfEventMmapPage,
        data: *mut u8,
        capacity: usize,
        written: u64,
        _storage: Vec<u8>,
    }

    impl FakeRing {
        fn new(capacity: usize) -> Self {
            let meta = Box::into_raw(Box::new(unsafe {
                std::mem::zeroed::<PerfEventMmapPage>()
            }));
            let mut storage = vec![0u8; capacity];
            let data = storage.as_mut_ptr();
            FakeRing {
                meta,
                data,
                capacity,
                written: 0,
                _storage: storage,
            }
        }

        fn reader(&self) -> RingReader {
            unsafe { RingReader::new(self.meta, self.data, self.capacity) }
        }

        fn push(&mut self, bytes: &[u8]) {
            for &b in bytes {
                let at = (self.written % self.capacity as u64) as usize;
                unsafe { self.data.add(at).write(b) };
                self.written += 1;
            }
        }

        fn push_record(&mut self, kind: u32, size: u16, payload: &[u8]) {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&kind.to_ne_bytes());
            bytes.extend_from_slice(&0u16.to_ne_bytes());
            bytes.extend_from_slice(&size.to_ne_bytes());
            bytes.extend_from_slice(payload);
            self.push(&bytes);
        }

        fn push_sample(&mut self, ip: u64, pid: u32) {
            let mut payload = Vec::new();
            payload.extend_from_slice(&ip.to_ne_bytes());
            payload.extend_from_slice(&pid.to_ne_bytes());
            payload.extend_from_slice(&(pid + 1).to_ne_bytes());
            payload.extend_from_slice(&1000u64.to_ne_bytes());
            payload.extend_from_slice(&2u32.to_ne_bytes());
            payload.extend_from_slice(&0u32.to_ne_bytes());
            self.push_record(PERF_RECORD_SAMPLE, SAMPLE_RECORD_SIZE as u16, &payload);
        }

        fn publish(&mut self) {
            unsafe { (*self.meta).data_head = self.written };
        }

        fn tail(&self) -> u64 {
            unsafe { (*self.meta).data_tail }
        }
    }

    impl Drop for FakeRing {
        fn drop(&mut self) {
            drop(unsafe { Box::from_raw(self.meta) });
        }
    }

    #[test]
    fn test_poll_dispatches_samples_and_skips_others() {
        let mut fake = FakeRing::new(256);
        fake.push_sample(0x1000, 10);
        fake.push_record(PERF_RECORD_LOST, 24, &[0u8; 16]);
        fake.push_sample(0x2000, 20);
        fake.publish();

        let mut reader = fake.reader();
        let mut seen = Vec::new();
        let stats = reader.poll(|s| seen.push((s.ip, s.pid, s.tid, s.cpu))).unwrap();

        assert_eq!(stats, PollStats { samples: 2, skipped: 1 });
        assert_eq!(seen, vec![(0x1000, 10, 11, 2), (0x2000, 20, 21, 2)]);
        assert_eq!(fake.tail(), fake.written);
    }

    #[test]
    fn test_second_poll_without_new_data_is_empty() {
        let mut fake = FakeRing::new(128);
        fake.push_sample(0x1000, 1);
        fake.publish();

        let mut reader = fake.reader();
        reader.poll(|_| {}).unwrap();
        let tail = fake.tail();

        let mut calls = 0;
        let stats = reader.poll(|_| calls += 1).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(stats, PollStats::default());
        assert_eq!(fake.tail(), tail);
    }

    #[test]
    fn test_records_split_by_wraparound() {
        // 64-byte ring: second 40-byte sample straddles the end
        let mut fake = FakeRing::new(64);
        let mut reader = fake.reader();

        fake.push_sample(0xaaaa, 1);
        fake.publish();
        reader.poll(|_| {}).unwrap();

        fake.push_sample(0xbbbb, 2);
        fake.publish();
        let mut ips = Vec::new();
        reader.poll(|s| ips.push(s.ip)).unwrap();

        assert_eq!(ips, vec![0xbbbb]);
        assert_eq!(reader.position(), 80);
        assert_eq!(fake.tail(), 80);
    }

    #[test]
    fn test_sample_size_mismatch_is_fatal() {
        let mut fake = FakeRing::new(128);
        fake.push_record(PERF_RECORD_SAMPLE, 48, &[0u8; 40]);
        fake.publish();

        let err = fake.reader().poll(|_| {}).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_record_past_producer_is_fatal() {
        let mut fake = FakeRing::new(128);
        fake.push_record(PERF_RECORD_LOST, 64, &[0u8; 8]);
        fake.publish();

        let err = fake.reader().poll(|_| {}).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_undersized_record_is_fatal() {
        let mut fake = FakeRing::new(128);
        fake.push_record(PERF_RECORD_LOST, 0, &[]);
        fake.publish();

        let err = fake.reader().poll(|_| {}).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_resumes_from_published_tail() {
        let mut fake = FakeRing::new(128);
        fake.push_sample(0x1, 1);
        fake.push_sample(0x2, 2);
        fake.publish();
        unsafe { (*fake.meta).data_tail = SAMPLE_RECORD_SIZE as u64 };

        let mut ips = Vec::new();
        fake.reader().poll(|s| ips.push(s.ip)).unwrap();
        assert_eq!(ips, vec![0x2]);
    }

    #[test]
    fn test_attr_configuration() {
        let config = SessionConfig {
            event: SampledEvent::Instructions,
            frequency: 999,
            ..Default::default()
        };
        let attr = config.attr(4096);

        assert_eq!(attr.size as usize, std::mem::size_of::<PerfEventAttr>());
        assert_eq!(attr.type_, PERF_TYPE_HARDWARE);
        assert_eq!(attr.config, PERF_COUNT_HW_INSTRUCTIONS);
        assert_eq!(attr.sample_type, SAMPLE_TYPE);
        assert_eq!(attr.sample_period_or_freq, 999);
        assert_eq!(attr.wakeup_events_or_watermark, 2048);
        assert_ne!(attr.flags & PerfEventAttr::FREQ_BIT, 0);
        assert_ne!(attr.flags & PerfEventAttr::DISABLED_BIT, 0);
        assert_ne!(attr.flags & PerfEventAttr::EXCLUDE_HV_BIT, 0);
    }

    #[test]
    fn test_mmap_page_layout() {
        assert_eq!(std::mem::offset_of!(PerfEventMmapPage, data_head), 1024);
        assert_eq!(std::mem::offset_of!(PerfEventMmapPage, data_tail), 1032);
    }
}
