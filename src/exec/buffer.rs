// src/exec/buffer.rs

//! Capped, append-only output buffers for child process streams.

use std::sync::{Arc, Mutex};

/// A capped byte buffer one stream reader appends into.
///
/// Once the cap is reached further bytes are discarded and the buffer is
/// marked truncated; truncation is metadata, never a failure.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    cap: usize,
    truncated: bool,
}

/// Shared handle to an [`OutputBuffer`].
///
/// A `std::sync::Mutex` is deliberate here: appends and snapshots are short
/// and never held across an await point.
pub type SharedBuffer = Arc<Mutex<OutputBuffer>>;

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            truncated: false,
        }
    }

    pub fn shared(cap: usize) -> SharedBuffer {
        Arc::new(Mutex::new(Self::new(cap)))
    }

    /// Append a chunk, respecting the cap.
    pub fn append(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        let remaining = self.cap.saturating_sub(self.bytes.len());
        if chunk.len() <= remaining {
            self.bytes.extend_from_slice(chunk);
        } else {
            self.bytes.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Lossy UTF-8 snapshot of the buffered output.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_below_cap_keeps_everything() {
        let mut buf = OutputBuffer::new(16);
        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.to_string_lossy(), "hello world");
        assert!(!buf.truncated());
    }

    #[test]
    fn append_past_cap_truncates_and_marks() {
        let mut buf = OutputBuffer::new(8);
        buf.append(b"0123456789");
        assert_eq!(buf.len(), 8);
        assert!(buf.truncated());

        // Further appends are dropped entirely.
        buf.append(b"more");
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.to_string_lossy(), "01234567");
    }

    #[test]
    fn exact_cap_is_not_truncation() {
        let mut buf = OutputBuffer::new(4);
        buf.append(b"abcd");
        assert_eq!(buf.len(), 4);
        assert!(!buf.truncated());
    }
}
