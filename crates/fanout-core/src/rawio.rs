//! Raw descriptor helpers `mio` doesn't cover: non-blocking mode, DSCP, the
//! FIONREAD peek, and the send/read syscalls the write/drain paths use.
//!
//! Same `libc`-via-`setsockopt` style used elsewhere in this codebase for
//! socket buffer sizing.

use std::io;
use std::os::unix::io::RawFd;

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Sets IP_TOS (v4) or IPV6_TCLASS (v6) to `(dscp & 0x3f) << 2`. `family`
/// selects which socket option to use; callers determine it from the peer
/// address. Logs and returns the error rather than failing the caller's add.
pub fn set_dscp(fd: RawFd, dscp: i32, is_ipv6: bool) -> io::Result<()> {
    let tos: libc::c_int = (dscp & 0x3f) << 2;
    let ret = unsafe {
        if is_ipv6 {
            libc::setsockopt(
                fd,
                libc::IPPROTO_IPV6,
                libc::IPV6_TCLASS,
                &tos as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        } else {
            libc::setsockopt(
                fd,
                libc::IPPROTO_IP,
                libc::IP_TOS,
                &tos as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        }
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Bytes currently queued for reading, via `ioctl(FIONREAD)`. `Ok(0)` means
/// the peer has closed (for a socket) or EOF (for a plain fd).
pub fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut n: libc::c_int = 0;
    let ret = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut n as *mut libc::c_int) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n.max(0) as usize)
}

/// Discards up to `len` bytes from `fd` into `scratch`. Returns the number
/// of bytes actually read (0 only on a genuine EOF race, which callers
/// normally won't see since `bytes_available` already reported > 0).
pub fn discard_read(fd: RawFd, scratch: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd, scratch.as_mut_ptr() as *mut libc::c_void, scratch.len()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

/// Writes `buf` to `fd`, using `send(MSG_NOSIGNAL)` for sockets so a peer
/// reset surfaces as `ECONNRESET` rather than `SIGPIPE`, or plain `write`
/// otherwise.
pub fn write_chunk(fd: RawFd, buf: &[u8], is_socket: bool) -> io::Result<usize> {
    let ret = unsafe {
        if is_socket {
            libc::send(
                fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        } else {
            libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len())
        }
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

/// Cheap liveness probe used when the poll wait itself fails with `EBADF`:
/// a closed/invalid descriptor fails `fstat` with `EBADF`.
pub fn is_ebadf(fd: RawFd) -> bool {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::fstat(fd, &mut st as *mut libc::stat) };
    ret < 0 && io::Error::last_os_error().raw_os_error() == Some(libc::EBADF)
}
