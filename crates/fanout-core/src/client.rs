//! Per-client state.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use crate::buffer::BufferRef;
use crate::caps::CapsFingerprint;
use crate::queue::Limit;
use crate::time::Nanos;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientStatus {
    Ok,
    Closed,
    Removed,
    Slow,
    Error,
    Flushing,
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMethod {
    Latest,
    NextKeyframe,
    LatestKeyframe,
    Burst,
    BurstKeyframe,
    BurstWithKeyframe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecoverPolicy {
    #[default]
    None,
    ResyncLatest,
    ResyncSoftLimit,
    ResyncKeyframe,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClientStats {
    pub bytes_sent: u64,
    pub dropped_buffers: u64,
    pub connect_time: Nanos,
    pub disconnect_time: Option<Nanos>,
    pub last_activity_time: Nanos,
    pub first_buffer_ts: Option<Nanos>,
    pub last_buffer_ts: Option<Nanos>,
}

/// Public snapshot returned by `get_stats`. A named struct is easier to
/// extend than a positional tuple; `connected_duration` is derived.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub connect_time: Nanos,
    pub disconnect_time: Option<Nanos>,
    pub connected_duration: Option<std::time::Duration>,
    pub last_activity_time: Nanos,
    pub dropped_buffers: u64,
    pub first_buffer_ts: Option<Nanos>,
    pub last_buffer_ts: Option<Nanos>,
    /// True if the recover policy force-moved this client's position since
    /// the last `get_stats` call.
    pub discont: bool,
}

pub struct Client {
    pub fd: RawFd,
    pub is_socket: bool,
    pub status: ClientStatus,
    pub sync_method: SyncMethod,
    pub burst_min: Limit,
    pub burst_max: Limit,

    pub bufpos: i64,
    pub bufoffset: usize,
    pub sending: VecDeque<BufferRef>,
    pub flushcount: i64,

    pub new_connection: bool,
    pub discont: bool,
    pub currently_removing: bool,

    /// `(generation, header buffers sent at that generation)`; `None` until
    /// the first stream-header send.
    pub last_headers: Option<(CapsFingerprint, Vec<BufferRef>)>,

    pub stats: ClientStats,
    pub label: String,
}

impl Client {
    pub fn new(
        fd: RawFd,
        is_socket: bool,
        sync_method: SyncMethod,
        burst_min: Limit,
        burst_max: Limit,
        now: Nanos,
        label: String,
    ) -> Self {
        Client {
            fd,
            is_socket,
            status: ClientStatus::Ok,
            sync_method,
            burst_min,
            burst_max,
            bufpos: -1,
            bufoffset: 0,
            sending: VecDeque::new(),
            flushcount: -1,
            new_connection: true,
            discont: false,
            currently_removing: false,
            last_headers: None,
            stats: ClientStats {
                connect_time: now,
                last_activity_time: now,
                ..ClientStats::default()
            },
            label,
        }
    }

    /// A read-once latch: `discont` reports `true` at most once per
    /// recover-policy jump.
    pub fn snapshot_stats(&mut self) -> StatsSnapshot {
        let connected_duration = self.stats.disconnect_time.map(|d| {
            std::time::Duration::from_nanos(d.0.saturating_sub(self.stats.connect_time.0))
        });
        let discont = std::mem::take(&mut self.discont);
        StatsSnapshot {
            bytes_sent: self.stats.bytes_sent,
            connect_time: self.stats.connect_time,
            disconnect_time: self.stats.disconnect_time,
            connected_duration,
            last_activity_time: self.stats.last_activity_time,
            dropped_buffers: self.stats.dropped_buffers,
            first_buffer_ts: self.stats.first_buffer_ts,
            last_buffer_ts: self.stats.last_buffer_ts,
            discont,
        }
    }

    pub fn is_serviceable(&self) -> bool {
        matches!(self.status, ClientStatus::Ok | ClientStatus::Flushing)
    }
}
