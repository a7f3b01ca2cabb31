//! The unit of data the core moves: an immutable, reference-counted byte blob.

use std::sync::Arc;

use crate::time::Nanos;

/// An opaque media buffer.
///
/// The core never inspects the payload beyond its length; `is_header` and
/// `is_delta` are the only bits of structure it cares about.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    pts: Option<Nanos>,
    is_header: bool,
    is_delta: bool,
}

impl Buffer {
    pub fn new(data: Vec<u8>, pts: Option<Nanos>, is_header: bool, is_delta: bool) -> Self {
        Buffer { data, pts, is_header, is_delta }
    }

    /// Convenience constructor for an ordinary (non-header) keyframe.
    pub fn keyframe(data: Vec<u8>, pts: Option<Nanos>) -> Self {
        Buffer::new(data, pts, false, false)
    }

    /// Convenience constructor for an ordinary delta (non-keyframe) frame.
    pub fn delta(data: Vec<u8>, pts: Option<Nanos>) -> Self {
        Buffer::new(data, pts, false, true)
    }

    /// Convenience constructor for a stream-header buffer.
    pub fn header(data: Vec<u8>) -> Self {
        Buffer::new(data, None, true, false)
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn pts(&self) -> Option<Nanos> {
        self.pts
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        self.is_header
    }

    #[inline]
    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    /// A sync frame ("keyframe") is any buffer not marked delta.
    #[inline]
    pub fn is_sync_frame(&self) -> bool {
        !self.is_delta
    }
}

pub type BufferRef = Arc<Buffer>;

/// Byte-content equality between two ordered stream-header sets, used by the
/// stream-header gate to decide whether a resend is needed.
pub fn headers_equal(a: &[BufferRef], b: &[BufferRef]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.data() == y.data())
}
