//! The single I/O worker thread: poll wait, per-client read-drain and
//! write, slow-client eviction.

use std::os::unix::io::RawFd;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mio::event::Event;
use mio::unix::SourceFd;
use mio::{Events, Interest, Token};
use tracing::{debug, error, warn};

use crate::caps::{header_gate, HeaderAction, StreamHeaders};
use crate::client::{Client, ClientStatus};
use crate::error::SinkError;
use crate::queue::Queue;
use crate::rawio;
use crate::sink::{Inner, Shared, WAKE_TOKEN};
use crate::sync_policy::{choose_start, SyncOutcome};
use crate::time::Nanos;

const READ_CHUNK: usize = 512;

enum WriteOutcome {
    /// Nothing left to send right now; disable write-interest.
    Disarm,
    Remove(ClientStatus),
    /// A write would block; stop trying this round, interest stays armed.
    Yield,
    /// Made progress (filled `sending` or wrote some bytes); interest
    /// stays armed.
    Progress,
}

pub(crate) fn run(inner: std::sync::Arc<Inner>, mut poll: mio::Poll) {
    let mut events = Events::with_capacity(256);
    while inner.running.load(Ordering::Acquire) {
        if let Err(err) = handle_clients(&inner, &mut poll, &mut events) {
            error!(error = %err, "fan-out I/O loop hit a fatal error");
            inner.observer.fatal_error(&err);
            break;
        }
    }
}

fn handle_clients(
    inner: &Inner,
    poll: &mut mio::Poll,
    events: &mut Events,
) -> Result<(), SinkError> {
    let timeout = poll_timeout(inner);
    match poll.poll(events, timeout) {
        Ok(()) => {}
        Err(e) => {
            return match e.raw_os_error() {
                Some(libc::EINTR) => Ok(()),
                Some(libc::EBADF) => {
                    probe_ebadf(inner);
                    Ok(())
                }
                _ => Err(SinkError::Poll(e)),
            };
        }
    }

    if events.is_empty() {
        scan_idle_timeout(inner);
        return Ok(());
    }

    for event in events.iter() {
        if event.token() == WAKE_TOKEN {
            continue;
        }
        let fd = event.token().0 as RawFd;
        service_client(inner, fd, event);
    }
    Ok(())
}

fn poll_timeout(inner: &Inner) -> Option<Duration> {
    if inner.config.timeout_ns == 0 {
        None
    } else {
        Some(Duration::from_nanos(inner.config.timeout_ns))
    }
}

/// Per-event reaction, keyed directly by the descriptor carried in the poll
/// event rather than by list position — no restart logic is needed even
/// though this may trigger the same collect-then-notify removal used by the
/// table-wide scans below.
fn service_client(inner: &Inner, fd: RawFd, event: &Event) {
    let now = Nanos::now();
    let mut doom: Option<ClientStatus> = None;
    let mut disarm = false;

    {
        let mut shared = inner.shared.lock().unwrap();
        let Shared { queue, table, headers, .. } = &mut *shared;
        let Some(client) = table.get_mut(fd) else { return };

        if !client.is_serviceable() {
            doom = Some(client.status);
        } else if event.is_read_closed() || event.is_write_closed() {
            doom = Some(ClientStatus::Closed);
        } else if event.is_error() {
            doom = Some(ClientStatus::Error);
        } else {
            client.stats.last_activity_time = now;

            if doom.is_none() && inner.config.handle_read && event.is_readable() {
                if let Some(status) = handle_read(fd, client) {
                    doom = Some(status);
                }
            }

            if doom.is_none() && event.is_writable() {
                match handle_write(client, queue, headers, inner.config.resend_streamheader) {
                    WriteOutcome::Disarm => disarm = true,
                    WriteOutcome::Remove(status) => doom = Some(status),
                    WriteOutcome::Yield | WriteOutcome::Progress => {}
                }
            }
        }

        if let Some(status) = doom {
            if !mark_doomed(client, &inner.registry, status, now) {
                doom = None;
            }
        } else if disarm {
            reregister(&inner.registry, fd, Interest::READABLE);
        }
    }

    if let Some(status) = doom {
        finish_doomed(inner, &[(fd, status)]);
    }
}

fn handle_read(fd: RawFd, client: &mut Client) -> Option<ClientStatus> {
    let available = match rawio::bytes_available(fd) {
        Ok(n) => n,
        Err(_) => return Some(ClientStatus::Error),
    };
    if available == 0 {
        return Some(ClientStatus::Closed);
    }
    let mut scratch = [0u8; READ_CHUNK];
    let to_read = available.min(READ_CHUNK);
    match rawio::discard_read(fd, &mut scratch[..to_read]) {
        Ok(0) => Some(ClientStatus::Error),
        Ok(_) => None,
        Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => None,
        Err(_) => Some(ClientStatus::Error),
    }
}

fn handle_write(
    client: &mut Client,
    queue: &Queue,
    headers: &StreamHeaders,
    resend_streamheader: bool,
) -> WriteOutcome {
    if client.sending.is_empty() {
        fill_sending(client, queue, headers, resend_streamheader)
    } else {
        write_head(client)
    }
}

fn fill_sending(
    client: &mut Client,
    queue: &Queue,
    headers: &StreamHeaders,
    resend_streamheader: bool,
) -> WriteOutcome {
    if client.bufpos == -1 {
        if client.flushcount == 0 {
            return WriteOutcome::Remove(ClientStatus::Removed);
        }
        return WriteOutcome::Disarm;
    }

    if client.new_connection && client.status != ClientStatus::Flushing {
        match choose_start(client, queue) {
            SyncOutcome::Start(pos) => {
                client.bufpos = pos;
                client.new_connection = false;
            }
            SyncOutcome::Wait { downgrade_to } => {
                if let Some(m) = downgrade_to {
                    client.sync_method = m;
                }
                client.bufpos = -1;
                return WriteOutcome::Disarm;
            }
        }
    }

    if client.flushcount == 0 {
        return WriteOutcome::Remove(ClientStatus::Removed);
    }

    let Some(buf) = queue.at(client.bufpos).cloned() else {
        return WriteOutcome::Disarm;
    };
    client.bufpos -= 1;

    if let Some(ts) = buf.pts() {
        if client.stats.first_buffer_ts.is_none() {
            client.stats.first_buffer_ts = Some(ts);
        }
        client.stats.last_buffer_ts = Some(ts);
    }
    if client.flushcount > 0 {
        client.flushcount -= 1;
    }

    apply_header_gate(client, headers, resend_streamheader);
    client.sending.push_back(buf);
    client.bufoffset = 0;
    WriteOutcome::Progress
}

fn apply_header_gate(client: &mut Client, headers: &StreamHeaders, resend_streamheader: bool) {
    let prev = client
        .last_headers
        .as_ref()
        .map(|(gen, bufs)| (*gen, bufs.as_slice()));
    match header_gate(prev, headers, resend_streamheader) {
        HeaderAction::Send | HeaderAction::Resend => {
            for b in headers.buffers() {
                client.sending.push_back(b.clone());
            }
            client.last_headers = Some((headers.generation(), headers.buffers().to_vec()));
        }
        HeaderAction::AdoptOnly => {
            client.last_headers = Some((headers.generation(), headers.buffers().to_vec()));
        }
        HeaderAction::UpToDate => {}
    }
}

fn write_head(client: &mut Client) -> WriteOutcome {
    let Some(head) = client.sending.front().cloned() else {
        return WriteOutcome::Progress;
    };
    let remaining = &head.data()[client.bufoffset..];
    match rawio::write_chunk(client.fd, remaining, client.is_socket) {
        Ok(n) if n == remaining.len() => {
            client.sending.pop_front();
            client.bufoffset = 0;
            client.stats.bytes_sent += n as u64;
            WriteOutcome::Progress
        }
        Ok(n) => {
            client.bufoffset += n;
            client.stats.bytes_sent += n as u64;
            WriteOutcome::Yield
        }
        Err(e) => match e.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => WriteOutcome::Yield,
            Some(libc::ECONNRESET) => WriteOutcome::Remove(ClientStatus::Closed),
            _ => WriteOutcome::Remove(ClientStatus::Error),
        },
    }
}

fn scan_idle_timeout(inner: &Inner) {
    if inner.config.timeout_ns == 0 {
        return;
    }
    let now = Nanos::now();
    let mut doomed = Vec::new();
    {
        let mut shared = inner.shared.lock().unwrap();
        let Shared { table, .. } = &mut *shared;
        let fds: Vec<RawFd> = table.fds_in_order().collect();
        for fd in fds {
            let Some(client) = table.get_mut(fd) else { continue };
            if !client.is_serviceable() {
                continue;
            }
            let idle = now.saturating_sub(client.stats.last_activity_time).0;
            if idle > inner.config.timeout_ns {
                if mark_doomed(client, &inner.registry, ClientStatus::Slow, now) {
                    debug!(fd, idle_ns = idle, "evicting idle client");
                    doomed.push((fd, ClientStatus::Slow));
                }
            }
        }
    }
    finish_doomed(inner, &doomed);
}

fn probe_ebadf(inner: &Inner) {
    let now = Nanos::now();
    let mut doomed = Vec::new();
    {
        let mut shared = inner.shared.lock().unwrap();
        let Shared { table, .. } = &mut *shared;
        let fds: Vec<RawFd> = table.fds_in_order().collect();
        for fd in fds {
            if !rawio::is_ebadf(fd) {
                continue;
            }
            let Some(client) = table.get_mut(fd) else { continue };
            if mark_doomed(client, &inner.registry, ClientStatus::Error, now) {
                warn!(fd, "client descriptor failed EBADF probe");
                doomed.push((fd, ClientStatus::Error));
            }
        }
    }
    finish_doomed(inner, &doomed);
}

/// Removal procedure, first half: idempotent on `currently_removing`,
/// deregisters from the poll set, stamps `disconnect_time`, drops
/// references held in `sending` and the recorded stream-header set. Returns
/// `false` if the client was already being torn down.
pub(crate) fn mark_doomed(
    client: &mut Client,
    registry: &mio::Registry,
    status: ClientStatus,
    now: Nanos,
) -> bool {
    if client.currently_removing {
        return false;
    }
    client.currently_removing = true;
    client.status = status;
    let mut raw = client.fd;
    let _ = registry.deregister(&mut SourceFd(&raw));
    client.stats.disconnect_time = Some(now);
    client.sending.clear();
    client.last_headers = None;
    true
}

/// Removal procedure steps 5-8: emits `client_removed`, erases the client
/// from the table (bumping the cookie), then emits `client_fd_removed`.
pub(crate) fn finish_doomed(inner: &Inner, doomed: &[(RawFd, ClientStatus)]) {
    if doomed.is_empty() {
        return;
    }
    for &(fd, status) in doomed {
        inner.observer.client_removed(fd, status);
    }
    {
        let mut shared = inner.shared.lock().unwrap();
        for &(fd, _) in doomed {
            shared.table.remove(fd);
        }
    }
    for &(fd, _) in doomed {
        inner.observer.client_fd_removed(fd);
    }
}

pub(crate) fn reregister(registry: &mio::Registry, fd: RawFd, interest: Interest) {
    let mut raw = fd;
    let _ = registry.reregister(&mut SourceFd(&raw), Token(fd as usize), interest);
}
