//! Public entry point: the fan-out sink itself.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::unix::SourceFd;
use mio::{Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use fanout_utils::{thread_boot, ThreadPriority};

use crate::buffer::{Buffer, BufferRef};
use crate::caps::StreamHeaders;
use crate::client::{Client, ClientStatus, StatsSnapshot, SyncMethod};
use crate::config::SinkConfig;
use crate::io_loop::{self, finish_doomed, mark_doomed, reregister};
use crate::observer::{NullObserver, SinkObserver};
use crate::queue::{Limit, Queue};
use crate::rawio;
use crate::recover_policy::recover_position;
use crate::table::ClientTable;
use crate::time::Nanos;

pub(crate) const WAKE_TOKEN: Token = Token(usize::MAX);

pub(crate) struct Shared {
    pub(crate) queue: Queue,
    pub(crate) table: ClientTable,
    pub(crate) headers: StreamHeaders,
    pub(crate) last_was_header: bool,
}

pub(crate) struct Inner {
    pub(crate) shared: Mutex<Shared>,
    pub(crate) config: SinkConfig,
    pub(crate) observer: Arc<dyn SinkObserver>,
    pub(crate) registry: mio::Registry,
    pub(crate) waker: Waker,
    pub(crate) running: AtomicBool,
}

/// A multi-client fan-out sink: one bounded buffer queue, many independent
/// client read positions, one I/O worker thread. Cheap to construct any
/// number of times per process; there is no process-wide state.
pub struct Sink {
    inner: Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

impl Sink {
    pub fn new(config: SinkConfig) -> io::Result<Self> {
        Self::with_observer(config, Arc::new(NullObserver))
    }

    pub fn with_observer(config: SinkConfig, observer: Arc<dyn SinkObserver>) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(&registry, WAKE_TOKEN)?;

        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                queue: Queue::new(),
                table: ClientTable::new(),
                headers: StreamHeaders::default(),
                last_was_header: false,
            }),
            config,
            observer,
            registry,
            waker,
            running: AtomicBool::new(true),
        });

        let worker_inner = inner.clone();
        let worker = std::thread::Builder::new()
            .name("fanout-io".into())
            .spawn(move || {
                thread_boot(None, ThreadPriority::OSDefault);
                io_loop::run(worker_inner, poll);
            })?;

        Ok(Sink { inner, worker: Some(worker) })
    }

    /// Registers `fd` using the element-wide sync/burst defaults.
    pub fn add(&self, fd: RawFd, is_socket: bool, is_ipv6: bool) -> io::Result<()> {
        let cfg = &self.inner.config;
        self.add_full(
            fd,
            is_socket,
            is_ipv6,
            cfg.default_sync_method,
            Limit::new(cfg.burst_unit, cfg.burst_value),
            Limit::new(cfg.burst_max_unit, cfg.burst_max_value),
        )
    }

    pub fn add_full(
        &self,
        fd: RawFd,
        is_socket: bool,
        is_ipv6: bool,
        sync_method: SyncMethod,
        burst_min: Limit,
        burst_max: Limit,
    ) -> io::Result<()> {
        if burst_min.unit == burst_max.unit
            && !burst_min.is_disabled()
            && !burst_max.is_disabled()
            && burst_max.value < burst_min.value
        {
            warn!(fd, "rejecting add: burst_max < burst_min on the same unit");
            return Ok(());
        }

        let now = Nanos::now();
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.table.contains(fd) {
                drop(shared);
                debug!(fd, "rejecting add: descriptor already registered");
                self.inner.observer.client_removed(fd, ClientStatus::Duplicate);
                return Ok(());
            }

            rawio::set_nonblocking(fd)?;
            if is_socket && self.inner.config.qos_dscp >= 0 {
                if let Err(e) = rawio::set_dscp(fd, self.inner.config.qos_dscp, is_ipv6) {
                    warn!(fd, error = %e, "failed to set DSCP on client socket");
                }
            }

            let mut raw = fd;
            self.inner
                .registry
                .register(&mut SourceFd(&raw), Token(fd as usize), Interest::READABLE)?;

            let client = Client::new(fd, is_socket, sync_method, burst_min, burst_max, now, format!("fd{fd}"));
            shared.table.insert(client);
        }

        info!(fd, "client added");
        self.inner.observer.client_added(fd);
        Ok(())
    }

    /// Immediate removal: does not drain the client's pending-send queue.
    pub fn remove(&self, fd: RawFd) {
        let now = Nanos::now();
        let doomed = {
            let mut shared = self.inner.shared.lock().unwrap();
            let Some(client) = shared.table.get_mut(fd) else {
                debug!(fd, "remove: unknown descriptor");
                return;
            };
            if client.status != ClientStatus::Ok && client.status != ClientStatus::Flushing {
                return;
            }
            if mark_doomed(client, &self.inner.registry, ClientStatus::Removed, now) {
                vec![(fd, ClientStatus::Removed)]
            } else {
                Vec::new()
            }
        };
        finish_doomed(&self.inner, &doomed);
    }

    /// Drains the client's pending-send queue, then removes it.
    pub fn remove_flush(&self, fd: RawFd) {
        let mut shared = self.inner.shared.lock().unwrap();
        let Some(client) = shared.table.get_mut(fd) else {
            debug!(fd, "remove_flush: unknown descriptor");
            return;
        };
        if client.status != ClientStatus::Ok {
            return;
        }
        client.flushcount = client.bufpos + 1;
        client.status = ClientStatus::Flushing;
    }

    pub fn get_stats(&self, fd: RawFd) -> Option<StatsSnapshot> {
        let mut shared = self.inner.shared.lock().unwrap();
        match shared.table.get_mut(fd) {
            Some(client) => Some(client.snapshot_stats()),
            None => {
                debug!(fd, "get_stats: unknown descriptor");
                None
            }
        }
    }

    /// The producer path. Prepends `buf` to the queue (or
    /// folds it into the stream-header set), advances every live client's
    /// virtual position, applies recover/eviction policy, and trims the
    /// queue tail.
    pub fn render(&self, data: Buffer) {
        let buf: BufferRef = Arc::new(data);
        let now = Nanos::now();
        let mut to_arm: Vec<RawFd> = Vec::new();
        let mut doomed: Vec<(RawFd, ClientStatus)> = Vec::new();
        let mut need_signal = false;

        {
            let mut shared = self.inner.shared.lock().unwrap();
            let Shared { queue, table, headers, last_was_header } = &mut *shared;

            if buf.is_header() {
                if *last_was_header {
                    headers.append(buf);
                } else {
                    headers.reset(buf);
                }
                *last_was_header = true;
                return;
            }
            *last_was_header = false;

            queue.prepend(buf);

            let cfg = &self.inner.config;
            let hard_max_idx = queue.count_to_max(Limit::new(cfg.unit_type, cfg.units_max));
            let soft_max_idx = queue.count_to_max(Limit::new(cfg.unit_type, cfg.units_soft_max));

            for (&fd, client) in table.iter_mut() {
                if !client.is_serviceable() {
                    continue;
                }
                client.bufpos += 1;
                fanout_utils::safe_assert!(
                    client.bufpos < queue.len() as i64,
                    "fd {fd}: bufpos {} out of range for queue len {}",
                    client.bufpos,
                    queue.len(),
                );

                if soft_max_idx >= 0 && client.bufpos >= soft_max_idx {
                    let new_pos = recover_position(cfg.recover_policy, queue, client.bufpos, soft_max_idx);
                    if new_pos != client.bufpos {
                        client.stats.dropped_buffers += (client.bufpos - new_pos).max(0) as u64;
                        client.discont = true;
                        client.bufpos = new_pos;
                    }
                }

                let idle = cfg.timeout_ns > 0
                    && now.saturating_sub(client.stats.last_activity_time).0 > cfg.timeout_ns;
                let over_hard_max = hard_max_idx >= 0 && client.bufpos >= hard_max_idx;

                if over_hard_max || idle {
                    client.bufpos = -1;
                    if mark_doomed(client, &self.inner.registry, ClientStatus::Slow, now) {
                        doomed.push((fd, ClientStatus::Slow));
                    }
                } else if client.bufpos == 0 || client.new_connection {
                    to_arm.push(fd);
                    need_signal = true;
                }
            }

            let mut max_usage: i64 = -1;
            for (_, client) in table.iter_mut() {
                if client.is_serviceable() {
                    max_usage = max_usage.max(client.bufpos);
                }
            }
            let (min_idx_floor, _, _) =
                queue.find_limits(cfg.bytes_min, cfg.buffers_min, cfg.time_min, -1, -1, -1);
            if queue.len() > 0 {
                max_usage = max_usage.max(min_idx_floor + 1);
            }
            if matches!(cfg.default_sync_method, SyncMethod::LatestKeyframe | SyncMethod::BurstKeyframe) {
                let bound = if soft_max_idx >= 0 {
                    (queue.len() as i64).min(soft_max_idx)
                } else {
                    queue.len() as i64
                };
                if bound > 0 {
                    if let Some(kf) = queue.nearest_sync_frame_newest(bound - 1) {
                        max_usage = max_usage.max(kf);
                    }
                }
            }
            let keep = (max_usage + 1).max(0) as usize;
            queue.trim_tail_to(keep);
        }

        for fd in to_arm {
            reregister(&self.inner.registry, fd, Interest::READABLE | Interest::WRITABLE);
        }
        if need_signal {
            let _ = self.inner.waker.wake();
        }
        finish_doomed(&self.inner, &doomed);
    }

    /// Stops the I/O worker thread. Outstanding descriptors are not closed
    /// here — the host owns them.
    pub fn stop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        let _ = self.inner.waker.wake();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let mut shared = self.inner.shared.lock().unwrap();
        shared.table.clear();
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
