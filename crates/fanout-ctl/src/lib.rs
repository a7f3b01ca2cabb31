//! CLI surface and demo-source plumbing for the `fanout-ctl` reference host.
//! Not part of the core's tested contract — this binary exists to prove the
//! core is usable end-to-end.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use fanout_core::{Limit, RecoverPolicy, SinkConfig, SyncMethod, Unit};

#[derive(Parser, Debug)]
#[command(name = "fanout-ctl", about = "Reference host for the fan-out sink core")]
pub struct Args {
    /// Address to accept client connections on.
    #[arg(long, default_value = "127.0.0.1:9000")]
    pub listen: String,

    /// Length-prefixed chunk file to stream; omit for a synthetic source.
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Every Nth chunk (1-indexed) is flagged as a keyframe.
    #[arg(long, default_value_t = 8)]
    pub keyframe_interval: u32,

    /// Delay between buffers fed into `render`, in milliseconds.
    #[arg(long, default_value_t = 20)]
    pub cadence_ms: u64,

    #[arg(long, value_enum, default_value_t = SyncArg::Latest)]
    pub sync: SyncArg,

    #[arg(long, value_enum, default_value_t = RecoverArg::None)]
    pub recover: RecoverArg,

    /// Hard queue-lag threshold in buffers; -1 disables it.
    #[arg(long, default_value_t = -1)]
    pub units_max: i64,

    /// Soft queue-lag threshold in buffers; -1 disables it.
    #[arg(long, default_value_t = -1)]
    pub units_soft_max: i64,

    /// Inactivity kick, in milliseconds; 0 disables it.
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,

    /// IP_TOS / IPV6_TCLASS DSCP value in [-1, 63]; -1 disables it.
    #[arg(long, default_value_t = -1)]
    pub dscp: i32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SyncArg {
    Latest,
    NextKeyframe,
    LatestKeyframe,
    Burst,
    BurstKeyframe,
    BurstWithKeyframe,
}

impl From<SyncArg> for SyncMethod {
    fn from(value: SyncArg) -> Self {
        match value {
            SyncArg::Latest => SyncMethod::Latest,
            SyncArg::NextKeyframe => SyncMethod::NextKeyframe,
            SyncArg::LatestKeyframe => SyncMethod::LatestKeyframe,
            SyncArg::Burst => SyncMethod::Burst,
            SyncArg::BurstKeyframe => SyncMethod::BurstKeyframe,
            SyncArg::BurstWithKeyframe => SyncMethod::BurstWithKeyframe,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RecoverArg {
    None,
    ResyncLatest,
    ResyncSoftLimit,
    ResyncKeyframe,
}

impl From<RecoverArg> for RecoverPolicy {
    fn from(value: RecoverArg) -> Self {
        match value {
            RecoverArg::None => RecoverPolicy::None,
            RecoverArg::ResyncLatest => RecoverPolicy::ResyncLatest,
            RecoverArg::ResyncSoftLimit => RecoverPolicy::ResyncSoftLimit,
            RecoverArg::ResyncKeyframe => RecoverPolicy::ResyncKeyframe,
        }
    }
}

pub fn config_from_args(args: &Args) -> SinkConfig {
    SinkConfig {
        unit_type: Unit::Buffers,
        units_max: args.units_max,
        units_soft_max: args.units_soft_max,
        default_sync_method: args.sync.into(),
        recover_policy: args.recover.into(),
        timeout_ns: args.timeout_ms.saturating_mul(1_000_000),
        qos_dscp: args.dscp,
        burst_unit: Unit::Buffers,
        burst_value: 32,
        burst_max_unit: Unit::Buffers,
        burst_max_value: 64,
        ..SinkConfig::default()
    }
}

/// Burst window used by `add_full` for every incoming connection.
pub fn burst_limits(_args: &Args) -> (Limit, Limit) {
    (Limit::new(Unit::Buffers, 32), Limit::new(Unit::Buffers, 64))
}

/// One length-prefixed (u32 LE) chunk from a demo source file.
pub fn read_chunks(path: &std::path::Path) -> io::Result<Vec<Vec<u8>>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut chunks = Vec::new();
    let mut cursor = &bytes[..];
    while cursor.len() >= 4 {
        let len = u32::from_le_bytes(cursor[..4].try_into().unwrap()) as usize;
        cursor = &cursor[4..];
        if cursor.len() < len {
            break;
        }
        chunks.push(cursor[..len].to_vec());
        cursor = &cursor[len..];
    }
    Ok(chunks)
}

/// A small synthetic source used when `--source` is omitted: fixed-size
/// chunks of incrementing bytes.
pub fn synthetic_chunks(count: usize, chunk_size: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| vec![(i % 256) as u8; chunk_size])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_chunks_parses_length_prefixed_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for chunk in [&b"abc"[..], &b"de"[..], &b""[..]] {
            file.write_all(&(chunk.len() as u32).to_le_bytes()).unwrap();
            file.write_all(chunk).unwrap();
        }
        file.flush().unwrap();

        let chunks = read_chunks(file.path()).unwrap();
        assert_eq!(chunks, vec![b"abc".to_vec(), b"de".to_vec(), Vec::new()]);
    }

    #[test]
    fn read_chunks_drops_a_truncated_trailing_record() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&10u32.to_le_bytes()).unwrap();
        file.write_all(b"short").unwrap();
        file.flush().unwrap();

        assert!(read_chunks(file.path()).unwrap().is_empty());
    }

    #[test]
    fn synthetic_chunks_cycles_byte_values() {
        let chunks = synthetic_chunks(3, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec![0u8; 4]);
        assert_eq!(chunks[1], vec![1u8; 4]);
        assert_eq!(chunks[2], vec![2u8; 4]);
    }

    #[test]
    fn burst_limits_are_buffer_counted() {
        let args = Args::parse_from(["fanout-ctl"]);
        let (min, max) = burst_limits(&args);
        assert_eq!(min.unit, Unit::Buffers);
        assert_eq!(max.unit, Unit::Buffers);
        assert!(min.value < max.value);
    }
}
