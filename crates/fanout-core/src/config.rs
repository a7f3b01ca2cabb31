//! Configuration surface.

use crate::client::{RecoverPolicy, SyncMethod};
use crate::queue::Unit;

/// Element-wide configuration. Defaults: no hard/soft max,
/// `RecoverPolicy::None`, `timeout = 0` (disabled), `handle_read = true`,
/// `resend_streamheader = true`, `dscp = -1`.
#[derive(Clone, Copy, Debug)]
pub struct SinkConfig {
    /// Unit that `units_max` / `units_soft_max` are expressed in.
    pub unit_type: Unit,
    /// Hard queue-lag threshold; -1 = unbounded.
    pub units_max: i64,
    /// Soft queue-lag threshold; -1 = unbounded.
    pub units_soft_max: i64,

    /// Minimum queue retention floor, independent of any client's needs.
    pub bytes_min: i64,
    pub buffers_min: i64,
    pub time_min: i64,

    /// Defaults used by `add` / `add_default`.
    pub burst_unit: Unit,
    pub burst_value: i64,
    pub burst_max_unit: Unit,
    pub burst_max_value: i64,
    pub default_sync_method: SyncMethod,

    pub recover_policy: RecoverPolicy,

    /// Inactivity kick, in nanoseconds; 0 disables it.
    pub timeout_ns: u64,

    /// IP_TOS / IPV6_TCLASS DSCP value, in `[-1, 63]`; -1 disables it.
    pub qos_dscp: i32,

    pub handle_read: bool,
    pub resend_streamheader: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            unit_type: Unit::Buffers,
            units_max: -1,
            units_soft_max: -1,
            bytes_min: -1,
            buffers_min: -1,
            time_min: -1,
            burst_unit: Unit::Undefined,
            burst_value: -1,
            burst_max_unit: Unit::Undefined,
            burst_max_value: -1,
            default_sync_method: SyncMethod::Latest,
            recover_policy: RecoverPolicy::None,
            timeout_ns: 0,
            qos_dscp: -1,
            handle_read: true,
            resend_streamheader: true,
        }
    }
}
