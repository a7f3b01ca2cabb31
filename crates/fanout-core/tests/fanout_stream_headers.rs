use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use fanout_core::{Buffer, Sink, SinkConfig};

fn bind_loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind(SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0)))
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("failed to fetch listener addr");
    (listener, addr)
}

fn read_until(stream: &mut TcpStream, want: usize, deadline: Duration) -> Vec<u8> {
    stream.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut out = Vec::new();
    let start = std::time::Instant::now();
    let mut scratch = [0u8; 4096];
    while out.len() < want && start.elapsed() < deadline {
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&scratch[..n]),
            Err(_) => {}
        }
    }
    out
}

/// A new client's first bytes are always the current stream-header set, in
/// order, ahead of any data buffer — even if headers were produced before
/// the client was ever added.
#[test]
fn new_client_receives_stream_headers_before_data() {
    let sink = Sink::new(SinkConfig::default()).expect("sink should construct");

    sink.render(Buffer::header(b"avc-sps-pps".to_vec()));
    sink.render(Buffer::keyframe(b"frame-0".to_vec(), None));

    let (listener, addr) = bind_loopback();
    let client = thread::spawn(move || TcpStream::connect(addr).expect("client connect failed"));
    let (accepted, _) = listener.accept().expect("accept failed");
    let mut client = client.join().unwrap();
    sink.add(accepted.as_raw_fd(), true, false).unwrap();
    std::mem::forget(accepted);

    sink.render(Buffer::delta(b"frame-1".to_vec(), None));

    let mut expected = b"avc-sps-pps".to_vec();
    expected.extend_from_slice(b"frame-1");
    let received = read_until(&mut client, expected.len(), Duration::from_secs(2));
    assert_eq!(received, expected);
}

/// A caps change (a fresh non-header -> header transition) resets the
/// stream-header set; clients already connected get the new set resent
/// ahead of the next data buffer.
#[test]
fn caps_change_resends_new_header_set() {
    let sink = Sink::new(SinkConfig::default()).expect("sink should construct");
    sink.render(Buffer::header(b"hdr-v1".to_vec()));

    let (listener, addr) = bind_loopback();
    let client = thread::spawn(move || TcpStream::connect(addr).expect("client connect failed"));
    let (accepted, _) = listener.accept().expect("accept failed");
    let mut client = client.join().unwrap();
    sink.add(accepted.as_raw_fd(), true, false).unwrap();
    std::mem::forget(accepted);

    sink.render(Buffer::keyframe(b"frame-a".to_vec(), None));
    let first = read_until(&mut client, b"hdr-v1frame-a".len(), Duration::from_secs(2));
    assert_eq!(first, b"hdr-v1frame-a");

    // New caps: a fresh header buffer followed by more data.
    sink.render(Buffer::header(b"hdr-v2".to_vec()));
    sink.render(Buffer::keyframe(b"frame-b".to_vec(), None));

    let expected = b"hdr-v2frame-b".to_vec();
    let received = read_until(&mut client, expected.len(), Duration::from_secs(2));
    assert_eq!(received, expected);
}
