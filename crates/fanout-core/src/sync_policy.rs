//! Sync/burst policy: choosing a new client's start index.

use crate::client::{Client, SyncMethod};
use crate::queue::Queue;

/// Outcome of a sync-policy evaluation. `Start(i)` gives the index to serve
/// from; `Wait` means -1 ("try again when more buffers arrive"), optionally
/// downgrading the client's sync method for the retry.
pub enum SyncOutcome {
    Start(i64),
    Wait { downgrade_to: Option<SyncMethod> },
}

/// Evaluate `client.sync_method` against `queue`. Called at most
/// once per client, the first time the I/O loop tries to serve it.
pub fn choose_start(client: &Client, queue: &Queue) -> SyncOutcome {
    use SyncMethod::*;
    match client.sync_method {
        Latest => SyncOutcome::Start(client.bufpos),
        NextKeyframe => match queue.nearest_sync_frame_newest(client.bufpos) {
            Some(idx) => SyncOutcome::Start(idx),
            None => SyncOutcome::Wait { downgrade_to: None },
        },
        LatestKeyframe => match queue.nearest_sync_frame_newest(queue.len() as i64 - 1) {
            Some(idx) => SyncOutcome::Start(idx),
            None => SyncOutcome::Wait { downgrade_to: Some(NextKeyframe) },
        },
        Burst => {
            let (min_idx, max_idx, _) = find_limits(client, queue);
            if max_idx <= min_idx {
                SyncOutcome::Start((max_idx - 1).max(0))
            } else {
                SyncOutcome::Start(min_idx)
            }
        }
        BurstKeyframe => {
            let (min_idx, max_idx, _) = find_limits(client, queue);
            if let Some(next) = queue.nearest_sync_frame_from(min_idx, queue.len() as i64) {
                if next < max_idx {
                    return SyncOutcome::Start(next);
                }
            }
            match queue.nearest_sync_frame_back_from(min_idx) {
                Some(prev) => SyncOutcome::Start(prev),
                None => SyncOutcome::Wait { downgrade_to: Some(NextKeyframe) },
            }
        }
        BurstWithKeyframe => {
            let (min_idx, max_idx, _) = find_limits(client, queue);
            if let Some(idx) = queue.nearest_sync_frame_from(min_idx, max_idx) {
                SyncOutcome::Start(idx)
            } else {
                SyncOutcome::Start(min_idx.min((max_idx - 1).max(0)))
            }
        }
    }
}

fn find_limits(client: &Client, queue: &Queue) -> (i64, i64, bool) {
    let (min_unit, min_val) = (client.burst_min.unit, client.burst_min.value);
    let (max_unit, max_val) = (client.burst_max.unit, client.burst_max.value);
    use crate::queue::Unit;
    let axis = |unit: Unit, val: i64, want: Unit| if unit == want { val } else { -1 };
    queue.find_limits(
        axis(min_unit, min_val, Unit::Bytes),
        axis(min_unit, min_val, Unit::Buffers),
        axis(min_unit, min_val, Unit::Time),
        axis(max_unit, max_val, Unit::Bytes),
        axis(max_unit, max_val, Unit::Buffers),
        axis(max_unit, max_val, Unit::Time),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::queue::{Limit, Unit};
    use crate::time::Nanos;
    use std::sync::Arc;

    fn client_with(sync: SyncMethod, burst_min: Limit, burst_max: Limit) -> Client {
        Client::new(3, true, sync, burst_min, burst_max, Nanos::ZERO, "t".into())
    }

    #[test]
    fn latest_returns_bufpos() {
        let mut c = client_with(SyncMethod::Latest, Limit::NONE, Limit::NONE);
        c.bufpos = 7;
        match choose_start(&c, &Queue::new()) {
            SyncOutcome::Start(i) => assert_eq!(i, 7),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn next_keyframe_waits_without_one() {
        let mut q = Queue::new();
        q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        let mut c = client_with(SyncMethod::NextKeyframe, Limit::NONE, Limit::NONE);
        c.bufpos = 0;
        match choose_start(&c, &q) {
            SyncOutcome::Wait { downgrade_to } => assert_eq!(downgrade_to, None),
            _ => panic!("expected wait"),
        }
    }

    #[test]
    fn burst_byte_window_picks_inclusive_min_exclusive_max() {
        let mut q = Queue::new();
        for _ in 0..4 {
            q.prepend(Arc::new(Buffer::delta(vec![0u8; 500], None)));
        }
        let c = client_with(
            SyncMethod::Burst,
            Limit::new(Unit::Bytes, 1000),
            Limit::new(Unit::Bytes, 2000),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Start(i) => assert_eq!(i, 1),
            _ => panic!("expected start"),
        }
    }

    /// Six buffers, keyframes at indices 1 and 4, `[min_idx, max_idx) = [0, 5)`:
    /// the nearest keyframe at or after `min_idx` (1) sits inside the window,
    /// so it wins over the farther one at 4.
    #[test]
    fn burst_keyframe_picks_nearest_next_inside_window() {
        let mut q = Queue::new();
        for is_kf in [false, true, false, false, true, false] {
            if is_kf {
                q.prepend(Arc::new(Buffer::keyframe(vec![0], None)));
            } else {
                q.prepend(Arc::new(Buffer::delta(vec![0], None)));
            }
        }
        let c = client_with(
            SyncMethod::BurstKeyframe,
            Limit::new(Unit::Buffers, 1),
            Limit::new(Unit::Buffers, 6),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Start(i) => assert_eq!(i, 1),
            _ => panic!("expected start"),
        }
    }

    /// Eight buffers, keyframes at indices 2 and 7, `min_idx = 3`,
    /// `max_idx = 5`: the forward search finds the keyframe at 7, which
    /// falls outside the window, so the policy falls back to the nearest
    /// keyframe at or before `min_idx`, found at 2.
    #[test]
    fn burst_keyframe_falls_back_to_nearest_prev_outside_window() {
        let mut q = Queue::new();
        // prepend pushes to the front, so push order is the reverse of the
        // final layout: final indices 2 and 7 hold keyframes.
        let push_order = [true, false, false, false, false, true, false, false];
        for is_kf in push_order {
            if is_kf {
                q.prepend(Arc::new(Buffer::keyframe(vec![0], None)));
            } else {
                q.prepend(Arc::new(Buffer::delta(vec![0], None)));
            }
        }
        assert!(q.at(2).unwrap().is_sync_frame());
        assert!(q.at(7).unwrap().is_sync_frame());

        let c = client_with(
            SyncMethod::BurstKeyframe,
            Limit::new(Unit::Buffers, 4),
            Limit::new(Unit::Buffers, 5),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Start(i) => assert_eq!(i, 2),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn burst_keyframe_downgrades_without_any_keyframe() {
        let mut q = Queue::new();
        for _ in 0..6 {
            q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        }
        let c = client_with(
            SyncMethod::BurstKeyframe,
            Limit::new(Unit::Buffers, 1),
            Limit::new(Unit::Buffers, 6),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Wait { downgrade_to } => {
                assert_eq!(downgrade_to, Some(SyncMethod::NextKeyframe))
            }
            _ => panic!("expected wait"),
        }
    }

    /// Same six-buffer, two-keyframe layout as the `BurstKeyframe` window
    /// test: the keyframe at 1 sits inside `[min_idx, max_idx) = [0, 5)`.
    #[test]
    fn burst_with_keyframe_picks_keyframe_inside_window() {
        let mut q = Queue::new();
        for is_kf in [false, true, false, false, true, false] {
            if is_kf {
                q.prepend(Arc::new(Buffer::keyframe(vec![0], None)));
            } else {
                q.prepend(Arc::new(Buffer::delta(vec![0], None)));
            }
        }
        let c = client_with(
            SyncMethod::BurstWithKeyframe,
            Limit::new(Unit::Buffers, 1),
            Limit::new(Unit::Buffers, 6),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Start(i) => assert_eq!(i, 1),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn burst_with_keyframe_falls_back_to_min_idx_without_one() {
        let mut q = Queue::new();
        for _ in 0..6 {
            q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        }
        let c = client_with(
            SyncMethod::BurstWithKeyframe,
            Limit::new(Unit::Buffers, 3),
            Limit::new(Unit::Buffers, 4),
        );
        match choose_start(&c, &q) {
            SyncOutcome::Start(i) => assert_eq!(i, 2),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn latest_keyframe_downgrades_without_keyframe() {
        let mut q = Queue::new();
        q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        let c = client_with(SyncMethod::LatestKeyframe, Limit::NONE, Limit::NONE);
        match choose_start(&c, &q) {
            SyncOutcome::Wait { downgrade_to } => {
                assert_eq!(downgrade_to, Some(SyncMethod::NextKeyframe))
            }
            _ => panic!("expected wait"),
        }
    }
}
