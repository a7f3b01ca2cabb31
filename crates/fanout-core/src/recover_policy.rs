//! Recover policy: repositioning a lagging client.

use crate::client::RecoverPolicy;
use crate::queue::Queue;

/// Outcome of evaluating the recover policy once a client's `bufpos` has
/// crossed the soft-max threshold. `soft_max_idx` is the already-computed
/// `count_to_max(units_soft_max)` value from the render step that triggered
/// this check (the caller's soft-max index is reused as-is, not recomputed).
pub fn recover_position(policy: RecoverPolicy, queue: &Queue, bufpos: i64, soft_max_idx: i64) -> i64 {
    match policy {
        RecoverPolicy::None => bufpos,
        RecoverPolicy::ResyncLatest => -1,
        RecoverPolicy::ResyncSoftLimit => soft_max_idx,
        RecoverPolicy::ResyncKeyframe => {
            let from = (queue.len() as i64 - 1).min(soft_max_idx - 1);
            match queue.nearest_sync_frame_back_from(from) {
                Some(idx) => idx,
                None => soft_max_idx,
            }
        }
    }
}
