use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use fanout_core::{Buffer, Sink};
use fanout_ctl::{burst_limits, read_chunks, synthetic_chunks, config_from_args, Args};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = config_from_args(&args);
    let (burst_min, burst_max) = burst_limits(&args);
    let sync_method = args.sync.into();

    let sink = match Sink::new(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to start fan-out sink");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&args.listen) {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, listen = %args.listen, "failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(listen = %args.listen, "fanout-ctl listening");

    let accept_sink = sink.clone();
    thread::spawn(move || {
        let sink = accept_sink;
        for incoming in listener.incoming() {
            let stream = match incoming {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let is_ipv6 = matches!(stream.peer_addr(), Ok(addr) if addr.is_ipv6());
            let fd = stream.as_raw_fd();
            if let Err(e) = sink.add_full(fd, true, is_ipv6, sync_method, burst_min, burst_max) {
                warn!(error = %e, fd, "failed to register client");
                continue;
            }
            // The sink now owns this descriptor; it is reclaimed via the
            // `client_fd_removed` notification (unused here — `fanout-ctl`
            // runs with the default no-op observer).
            stream.into_raw_fd();
        }
    });

    let chunks = match &args.source {
        Some(path) => read_chunks(path).unwrap_or_else(|e| {
            error!(error = %e, path = %path.display(), "failed to read source file");
            std::process::exit(1);
        }),
        None => synthetic_chunks(10_000, 4096),
    };

    if chunks.is_empty() {
        error!("source produced no chunks");
        std::process::exit(1);
    }

    let cadence = Duration::from_millis(args.cadence_ms);
    for (i, payload) in chunks.into_iter().enumerate() {
        let buf = if i == 0 {
            Buffer::header(payload)
        } else if i as u32 % args.keyframe_interval == 0 {
            Buffer::keyframe(payload, None)
        } else {
            Buffer::delta(payload, None)
        };
        sink.render(buf);
        thread::sleep(cadence);
    }

    info!("source exhausted, fanout-ctl exiting");
}
