//! Stream-header set and caps fingerprint.

use crate::buffer::{headers_equal, BufferRef};

/// Monotonically increasing generation counter standing in for an opaque
/// upstream caps fingerprint. Bumped exactly when the stream-header set is
/// reset, i.e. the instant a non-header -> header transition is detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapsFingerprint(u64);

impl CapsFingerprint {
    pub const NONE: CapsFingerprint = CapsFingerprint(0);

    fn next(self) -> Self {
        CapsFingerprint(self.0 + 1)
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// The current stream-header set plus the fingerprint it was last bumped at.
#[derive(Debug, Default)]
pub struct StreamHeaders {
    generation: CapsFingerprint,
    buffers: Vec<BufferRef>,
}

impl StreamHeaders {
    pub fn generation(&self) -> CapsFingerprint {
        self.generation
    }

    pub fn buffers(&self) -> &[BufferRef] {
        &self.buffers
    }

    /// Called from `render` when a header buffer follows a non-header one:
    /// drops the old set and starts a fresh one at the next generation.
    pub fn reset(&mut self, first: BufferRef) {
        self.generation = self.generation.next();
        self.buffers.clear();
        self.buffers.push(first);
    }

    /// Called from `render` for a header buffer following another header
    /// buffer: appends to the set in effect for the current generation.
    pub fn append(&mut self, buf: BufferRef) {
        self.buffers.push(buf);
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// What a client's stream-header gate should do on this write attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderAction {
    /// Nothing recorded yet: send the current set, adopt its generation.
    Send,
    /// Generations already match: nothing to do.
    UpToDate,
    /// Generations differ and a resend is warranted: send, adopt.
    Resend,
    /// Generations differ but no resend is warranted: just adopt.
    AdoptOnly,
}

/// Decide the gate action given the client's previously recorded
/// generation/content (`None` if the client has never sent headers) and the
/// current set.
pub fn header_gate(
    client_generation: Option<(CapsFingerprint, &[BufferRef])>,
    current: &StreamHeaders,
    resend_streamheader: bool,
) -> HeaderAction {
    match client_generation {
        None => HeaderAction::Send,
        Some((gen, _)) if gen == current.generation() => HeaderAction::UpToDate,
        Some(_) if current.is_empty() => HeaderAction::AdoptOnly,
        Some((_, prev)) if prev.is_empty() => HeaderAction::Resend,
        Some((_, prev)) => {
            if resend_streamheader && !headers_equal(prev, current.buffers()) {
                HeaderAction::Resend
            } else {
                HeaderAction::AdoptOnly
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use std::sync::Arc;

    fn hdr(b: &[u8]) -> BufferRef {
        Arc::new(Buffer::header(b.to_vec()))
    }

    #[test]
    fn reset_bumps_generation() {
        let mut h = StreamHeaders::default();
        assert_eq!(h.generation(), CapsFingerprint::NONE);
        h.reset(hdr(b"a"));
        assert_eq!(h.generation(), CapsFingerprint(1));
        h.reset(hdr(b"b"));
        assert_eq!(h.generation(), CapsFingerprint(2));
        assert_eq!(h.buffers().len(), 1);
    }

    #[test]
    fn gate_first_contact_sends() {
        let mut h = StreamHeaders::default();
        h.reset(hdr(b"a"));
        assert_eq!(header_gate(None, &h, true), HeaderAction::Send);
    }

    #[test]
    fn gate_same_generation_noop() {
        let mut h = StreamHeaders::default();
        h.reset(hdr(b"a"));
        let prev = h.buffers().to_vec();
        assert_eq!(
            header_gate(Some((h.generation(), &prev)), &h, true),
            HeaderAction::UpToDate
        );
    }

    #[test]
    fn gate_resend_on_value_change() {
        let mut h = StreamHeaders::default();
        h.reset(hdr(b"a"));
        let prev_gen = h.generation();
        let prev = h.buffers().to_vec();
        h.reset(hdr(b"b"));
        assert_eq!(
            header_gate(Some((prev_gen, &prev)), &h, true),
            HeaderAction::Resend
        );
    }

    #[test]
    fn gate_no_resend_when_disabled() {
        let mut h = StreamHeaders::default();
        h.reset(hdr(b"a"));
        let prev_gen = h.generation();
        let prev = h.buffers().to_vec();
        h.reset(hdr(b"b"));
        assert_eq!(
            header_gate(Some((prev_gen, &prev)), &h, false),
            HeaderAction::AdoptOnly
        );
    }

    #[test]
    fn gate_new_caps_no_headers_adopts_only() {
        let h = StreamHeaders::default();
        let prev = vec![hdr(b"a")];
        assert_eq!(
            header_gate(Some((CapsFingerprint(1), &prev)), &h, true),
            HeaderAction::AdoptOnly
        );
    }

    #[test]
    fn gate_prev_had_none_now_has_some_resends() {
        let mut h = StreamHeaders::default();
        h.reset(hdr(b"a"));
        let prev: Vec<BufferRef> = Vec::new();
        assert_eq!(
            header_gate(Some((CapsFingerprint::NONE, &prev)), &h, true),
            HeaderAction::Resend
        );
    }
}
