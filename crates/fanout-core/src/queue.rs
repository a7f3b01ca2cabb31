//! Bounded, newest-first ring of inbound buffers.

use std::collections::VecDeque;

use crate::buffer::BufferRef;

/// Which quantity a limit is expressed in. `Undefined` never participates in
/// limit computation (used as a filler when a client has no burst policy).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Buffers,
    Bytes,
    Time,
    Undefined,
}

/// A `(unit, value)` pair; `value == -1` means "no limit" (disabled).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit {
    pub unit: Unit,
    pub value: i64,
}

impl Limit {
    pub const NONE: Limit = Limit { unit: Unit::Undefined, value: -1 };

    pub fn new(unit: Unit, value: i64) -> Self {
        Limit { unit, value }
    }

    #[inline]
    pub fn is_disabled(self) -> bool {
        self.value < 0
    }
}

/// The global buffer queue. Index 0 is the newest buffer; new buffers are
/// prepended, old ones trimmed from the tail.
#[derive(Debug, Default)]
pub struct Queue {
    buffers: VecDeque<BufferRef>,
    bytes_served: u64,
    buffers_queued: u64,
}

impl Queue {
    pub fn new() -> Self {
        Queue::default()
    }

    pub fn prepend(&mut self, buf: BufferRef) {
        self.buffers.push_front(buf);
        self.buffers_queued += 1;
        fanout_utils::safe_assert!(self.buffers.len() as u64 <= i64::MAX as u64, "queue length overflowed i64");
    }

    pub fn at(&self, i: i64) -> Option<&BufferRef> {
        if i < 0 {
            return None;
        }
        self.buffers.get(i as usize)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served
    }

    pub fn buffers_queued(&self) -> u64 {
        self.buffers_queued
    }

    pub fn record_bytes_served(&mut self, n: u64) {
        self.bytes_served += n;
    }

    /// Drop buffers from the tail so the queue holds at most `keep` entries
    /// (`keep` buffers survive: indices `0..keep`).
    pub fn trim_tail_to(&mut self, keep: usize) {
        while self.buffers.len() > keep {
            self.buffers.pop_back();
        }
    }

    /// Smallest count of newest buffers such that the running total, per
    /// `limit.unit`, first exceeds `limit.value`. Returns `-1` when the limit
    /// is disabled, `len+1` when the limit is never exceeded within the
    /// queue.
    pub fn count_to_max(&self, limit: Limit) -> i64 {
        if limit.is_disabled() {
            return -1;
        }
        let len = self.buffers.len() as i64;
        match limit.unit {
            Unit::Undefined => -1,
            Unit::Buffers => limit.value,
            Unit::Bytes => {
                let mut acc: i64 = 0;
                for (i, buf) in self.buffers.iter().enumerate() {
                    acc += buf.size() as i64;
                    if acc > limit.value {
                        return i as i64 + 1;
                    }
                }
                len + 1
            }
            Unit::Time => {
                let first_ts = self.buffers.front().and_then(|b| b.pts());
                let Some(first_ts) = first_ts else { return len + 1 };
                for (i, buf) in self.buffers.iter().enumerate() {
                    if let Some(ts) = buf.pts() {
                        let delta = first_ts.0.saturating_sub(ts.0) as i64;
                        if delta > limit.value {
                            return i as i64 + 1;
                        }
                    }
                }
                len + 1
            }
        }
    }

    /// Walks the queue once computing the start index a burst sync method
    /// should use. -1 axes are treated as already satisfied for
    /// the min set, and as never-exceeded for the max set.
    pub fn find_limits(
        &self,
        bytes_min: i64,
        buffers_min: i64,
        time_min: i64,
        bytes_max: i64,
        buffers_max: i64,
        time_max: i64,
    ) -> (i64, i64, bool) {
        let len = self.buffers.len() as i64;
        if len == 0 {
            return (0, 0, false);
        }
        if buffers_min >= 0 && buffers_min > len {
            return (len - 1, len - 1, false);
        }

        let first_ts = self.buffers.front().and_then(|b| b.pts());

        let mut bytes_acc: i64 = 0;
        let mut min_idx: Option<i64> = None;
        let mut max_idx: Option<i64> = None;

        let mut min_bytes_done = bytes_min < 0;
        let mut min_buffers_done = buffers_min < 0;
        let mut min_time_done = time_min < 0;
        let mut max_bytes_hit = false;
        let mut max_buffers_hit = false;
        let mut max_time_hit = false;

        for (i, buf) in self.buffers.iter().enumerate() {
            let i = i as i64;
            bytes_acc += buf.size() as i64;

            if bytes_min >= 0 && !min_bytes_done && bytes_acc >= bytes_min {
                min_bytes_done = true;
            }
            if buffers_min >= 0 && !min_buffers_done && i + 1 >= buffers_min {
                min_buffers_done = true;
            }
            if time_min >= 0 && !min_time_done {
                if let (Some(first), Some(ts)) = (first_ts, buf.pts()) {
                    if first.0.saturating_sub(ts.0) as i64 >= time_min {
                        min_time_done = true;
                    }
                }
            }
            if min_idx.is_none() && min_bytes_done && min_buffers_done && min_time_done {
                min_idx = Some(i);
            }

            if bytes_max >= 0 && !max_bytes_hit && bytes_acc > bytes_max {
                max_bytes_hit = true;
            }
            if buffers_max >= 0 && !max_buffers_hit && i + 1 > buffers_max {
                max_buffers_hit = true;
            }
            if time_max >= 0 && !max_time_hit {
                if let (Some(first), Some(ts)) = (first_ts, buf.pts()) {
                    if first.0.saturating_sub(ts.0) as i64 > time_max {
                        max_time_hit = true;
                    }
                }
            }
            if max_idx.is_none() && (max_bytes_hit || max_buffers_hit || max_time_hit) {
                max_idx = Some(i);
            }
        }

        let max_idx = max_idx.unwrap_or(len - 1);
        let min_idx = min_idx.unwrap_or(max_idx).max(0);
        let satisfied = min_bytes_done
            && min_buffers_done
            && min_time_done
            && (max_bytes_hit || max_buffers_hit || max_time_hit);
        (min_idx, max_idx, satisfied)
    }

    /// Lowest-indexed (newest) buffer at or before `from` (inclusive) that is
    /// not marked delta, scanning newest -> oldest.
    pub fn nearest_sync_frame_newest(&self, from: i64) -> Option<i64> {
        if from < 0 {
            return None;
        }
        let start = from.min(self.buffers.len() as i64 - 1);
        for i in 0..=start {
            if self.buffers[i as usize].is_sync_frame() {
                return Some(i);
            }
        }
        None
    }

    /// Highest-indexed (oldest) buffer within `[from, to)` that is not
    /// marked delta, scanning oldest -> newest toward `from`.
    pub fn nearest_sync_frame_oldest(&self, from: i64, to: i64) -> Option<i64> {
        if from < 0 || to <= from {
            return None;
        }
        let to = to.min(self.buffers.len() as i64);
        for i in (from..to).rev() {
            if self.buffers[i as usize].is_sync_frame() {
                return Some(i);
            }
        }
        None
    }

    /// Lowest index in `[pivot, to)` that is a sync frame, scanning forward
    /// from `pivot` toward `to` (the match nearest `pivot` at or older than
    /// it).
    pub fn nearest_sync_frame_from(&self, pivot: i64, to: i64) -> Option<i64> {
        if pivot < 0 || to <= pivot {
            return None;
        }
        let to = to.min(self.buffers.len() as i64);
        for i in pivot..to {
            if self.buffers[i as usize].is_sync_frame() {
                return Some(i);
            }
        }
        None
    }

    /// Highest index in `[0, pivot]` that is a sync frame, scanning backward
    /// from `pivot` toward 0 (the match nearest `pivot` at or newer than it).
    pub fn nearest_sync_frame_back_from(&self, pivot: i64) -> Option<i64> {
        if pivot < 0 {
            return None;
        }
        let start = pivot.min(self.buffers.len() as i64 - 1);
        for i in (0..=start).rev() {
            if self.buffers[i as usize].is_sync_frame() {
                return Some(i);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use std::sync::Arc;

    fn push_sizes(q: &mut Queue, sizes: &[usize]) {
        for &s in sizes {
            q.prepend(Arc::new(Buffer::delta(vec![0u8; s], None)));
        }
    }

    #[test]
    fn find_limits_burst_byte_window() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[500, 500, 500, 500]);
        let (min_idx, max_idx, satisfied) = q.find_limits(1000, -1, -1, 2000, -1, -1);
        assert_eq!(min_idx, 1);
        assert_eq!(max_idx, 3);
        assert!(satisfied);
    }

    #[test]
    fn find_limits_all_disabled() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[10, 10, 10]);
        let (min_idx, max_idx, satisfied) = q.find_limits(-1, -1, -1, -1, -1, -1);
        assert_eq!(min_idx, 0);
        assert_eq!(max_idx, 2);
        // no max axis is enabled, so none can ever be "hit": satisfied is
        // false even though every min is trivially met.
        assert!(!satisfied);
    }

    #[test]
    fn find_limits_buffers_min_exceeds_len() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[10, 10]);
        let (min_idx, max_idx, satisfied) = q.find_limits(-1, 5, -1, -1, -1, -1);
        assert_eq!(min_idx, 1);
        assert_eq!(max_idx, 1);
        assert!(!satisfied);
    }

    #[test]
    fn count_to_max_buffers_is_literal() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[10, 10, 10, 10, 10]);
        assert_eq!(q.count_to_max(Limit::new(Unit::Buffers, 3)), 3);
    }

    #[test]
    fn count_to_max_disabled_is_minus_one() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[10]);
        assert_eq!(q.count_to_max(Limit::new(Unit::Buffers, -1)), -1);
    }

    #[test]
    fn count_to_max_bytes_never_exceeded() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[10, 10]);
        assert_eq!(q.count_to_max(Limit::new(Unit::Bytes, 1000)), 3);
    }

    #[test]
    fn trim_tail_keeps_newest() {
        let mut q = Queue::new();
        push_sizes(&mut q, &[1, 2, 3, 4]);
        q.trim_tail_to(2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.at(0).unwrap().size(), 4);
        assert_eq!(q.at(1).unwrap().size(), 3);
    }

    #[test]
    fn nearest_sync_frame_scans() {
        let mut q = Queue::new();
        q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        q.prepend(Arc::new(Buffer::keyframe(vec![0], None)));
        q.prepend(Arc::new(Buffer::delta(vec![0], None)));
        // queue (newest->oldest): [delta, keyframe, delta]
        assert_eq!(q.nearest_sync_frame_newest(2), Some(1));
        assert_eq!(q.nearest_sync_frame_oldest(0, 3), Some(1));
    }

    #[test]
    fn nearest_sync_frame_from_pivot_scans_toward_and_away_from_zero() {
        let mut q = Queue::new();
        // prepend order: indices end up newest->oldest as pushed here in reverse.
        for is_kf in [false, true, false, false, true, false] {
            if is_kf {
                q.prepend(Arc::new(Buffer::keyframe(vec![0], None)));
            } else {
                q.prepend(Arc::new(Buffer::delta(vec![0], None)));
            }
        }
        // queue (index 0..6): [delta, keyframe, delta, delta, keyframe, delta]
        // keyframes sit at indices 1 and 4.
        assert_eq!(q.nearest_sync_frame_from(0, 6), Some(1));
        assert_eq!(q.nearest_sync_frame_from(2, 6), Some(4));
        assert_eq!(q.nearest_sync_frame_from(2, 4), None);
        assert_eq!(q.nearest_sync_frame_back_from(5), Some(4));
        assert_eq!(q.nearest_sync_frame_back_from(3), Some(1));
        assert_eq!(q.nearest_sync_frame_back_from(0), None);
    }
}
