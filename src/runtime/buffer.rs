//! Byte queues for per-connection stream buffering.
//!
//! Every connection owns two queues: `incoming` accumulates bytes read from
//! the socket until the framer can consume whole frames, and `outgoing`
//! holds response bytes until the socket accepts them.
//!
//! Both are backed by `BytesMut`. Consuming from the front only advances an
//! internal offset, so extracting many small frames from a large backlog
//! never shifts the unconsumed tail. The freed prefix is reclaimed the next
//! time an append needs to reserve capacity.

use bytes::{Buf, BytesMut};

/// Initial capacity of a freshly created queue.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Append-at-back, consume-at-front byte buffer.
///
/// Never holds bytes that were already handed to the framer or already
/// written to the wire.
#[derive(Debug)]
pub struct ByteQueue {
    buf: BytesMut,
}

impl ByteQueue {
    /// Create an empty queue with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty queue that can hold `capacity` bytes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append bytes to the back of the queue.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Remove the first `n` bytes.
    ///
    /// # Panics
    /// Panics if `n` exceeds the number of queued bytes.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.buf.len(),
            "consume({n}) past end of queue (len {})",
            self.buf.len()
        );
        self.buf.advance(n);
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View of the queued bytes, front first.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_consume() {
        let mut queue = ByteQueue::new();
        assert!(queue.is_empty());

        queue.append(b"hello ");
        queue.append(b"world");
        assert_eq!(queue.len(), 11);
        assert_eq!(queue.as_slice(), b"hello world");

        queue.consume(6);
        assert_eq!(queue.as_slice(), b"world");

        queue.consume(5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consume_zero_is_noop() {
        let mut queue = ByteQueue::new();
        queue.append(b"abc");
        queue.consume(0);
        assert_eq!(queue.as_slice(), b"abc");
    }

    #[test]
    fn test_interleaved_append_after_consume() {
        let mut queue = ByteQueue::with_capacity(8);

        // Many small consumes followed by appends must preserve order
        for round in 0..1000u32 {
            queue.append(&round.to_le_bytes());
            if round % 2 == 1 {
                queue.consume(4);
            }
        }

        assert_eq!(queue.len(), 500 * 4);
        assert_eq!(&queue.as_slice()[..4], &500u32.to_le_bytes());
        assert_eq!(&queue.as_slice()[queue.len() - 4..], &999u32.to_le_bytes());
    }

    #[test]
    #[should_panic(expected = "past end of queue")]
    fn test_consume_past_end_panics() {
        let mut queue = ByteQueue::new();
        queue.append(b"ab");
        queue.consume(3);
    }
}
