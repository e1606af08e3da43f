//! Frame processing for the reactor.
//!
//! Applies the framed protocol to a connection's buffers: complete frames are
//! drained from `incoming` and their echo responses appended to `outgoing`.
//! Pure with respect to I/O; the caller decides when to read and write.

use crate::protocols::framed::{self, ParseResult};
use crate::runtime::ByteQueue;
use std::fmt;
use tracing::debug;

/// Bytes of body content included in diagnostic output.
const PREVIEW_LEN: usize = 64;

/// Protocol violation detected while framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Declared body length exceeds the configured maximum.
    TooLarge { length: usize, max: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLarge { length, max } => {
                write!(f, "frame length {length} exceeds maximum {max}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Result of processing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// No complete frame is buffered yet.
    NeedData,
    /// One or more frames were echoed into the output queue.
    Response { frames: usize, response_len: usize },
    /// Parsing stopped on a violation. Frames before it were still echoed
    /// and the offending bytes are left in the input queue.
    Error { frames: usize, error: FrameError },
}

/// Drain every complete frame from `incoming`, echoing each into `outgoing`.
pub fn process_frames(
    conn_id: usize,
    incoming: &mut ByteQueue,
    outgoing: &mut ByteQueue,
    max_frame_bytes: usize,
) -> ProcessResult {
    let mut frames = 0;
    let mut response_len = 0;

    loop {
        match framed::parse(incoming.as_slice(), max_frame_bytes) {
            ParseResult::Complete {
                body_len,
                frame_len,
            } => {
                let body = &incoming.as_slice()[framed::HEADER_LEN..frame_len];
                debug!(conn_id, len = body_len, body = %preview(body), "Received frame");

                // body_len was decoded from a u32 header
                outgoing.append(&framed::encode_header(body_len as u32));
                outgoing.append(body);
                incoming.consume(frame_len);

                frames += 1;
                response_len += frame_len;
            }
            ParseResult::Incomplete { .. } => break,
            ParseResult::TooLarge { length } => {
                return ProcessResult::Error {
                    frames,
                    error: FrameError::TooLarge {
                        length,
                        max: max_frame_bytes,
                    },
                };
            }
        }
    }

    if frames == 0 {
        ProcessResult::NeedData
    } else {
        ProcessResult::Response {
            frames,
            response_len,
        }
    }
}

fn preview(body: &[u8]) -> String {
    let shown = &body[..body.len().min(PREVIEW_LEN)];
    let mut text = String::from_utf8_lossy(shown).into_owned();
    if body.len() > PREVIEW_LEN {
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::framed::{encode, MAX_FRAME_BYTES};

    fn queue(data: &[u8]) -> ByteQueue {
        let mut q = ByteQueue::new();
        q.append(data);
        q
    }

    #[test]
    fn test_echo_ping() {
        let mut incoming = queue(&[0x04, 0x00, 0x00, 0x00, 0x70, 0x69, 0x6E, 0x67]);
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, MAX_FRAME_BYTES);

        assert_eq!(
            result,
            ProcessResult::Response {
                frames: 1,
                response_len: 8
            }
        );
        assert!(incoming.is_empty());
        assert_eq!(
            outgoing.as_slice(),
            &[0x04, 0x00, 0x00, 0x00, 0x70, 0x69, 0x6E, 0x67]
        );
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let mut input = encode(b"first");
        input.extend_from_slice(&encode(b""));
        input.extend_from_slice(&encode(b"third frame"));
        let mut incoming = queue(&input);
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, MAX_FRAME_BYTES);

        assert_eq!(
            result,
            ProcessResult::Response {
                frames: 3,
                response_len: input.len()
            }
        );
        assert_eq!(outgoing.as_slice(), &input[..]);
        assert!(incoming.is_empty());
    }

    #[test]
    fn test_trailing_partial_frame_is_kept() {
        let mut input = encode(b"done");
        let partial = encode(b"not yet");
        input.extend_from_slice(&partial[..6]);
        let mut incoming = queue(&input);
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, MAX_FRAME_BYTES);

        assert!(matches!(result, ProcessResult::Response { frames: 1, .. }));
        assert_eq!(outgoing.as_slice(), &encode(b"done")[..]);
        assert_eq!(incoming.as_slice(), &partial[..6]);
    }

    #[test]
    fn test_need_data() {
        let mut incoming = queue(&[0x04, 0x00]);
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, MAX_FRAME_BYTES);

        assert_eq!(result, ProcessResult::NeedData);
        assert_eq!(incoming.len(), 2);
        assert!(outgoing.is_empty());
    }

    #[test]
    fn test_oversized_after_valid_frame() {
        let mut input = encode(b"valid");
        let oversized = framed::encode_header(MAX_FRAME_BYTES as u32 + 1);
        input.extend_from_slice(&oversized);
        let mut incoming = queue(&input);
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, MAX_FRAME_BYTES);

        assert_eq!(
            result,
            ProcessResult::Error {
                frames: 1,
                error: FrameError::TooLarge {
                    length: MAX_FRAME_BYTES + 1,
                    max: MAX_FRAME_BYTES
                }
            }
        );
        // Valid frame echoed, offending header left unconsumed
        assert_eq!(outgoing.as_slice(), &encode(b"valid")[..]);
        assert_eq!(incoming.as_slice(), &oversized);
    }

    #[test]
    fn test_configured_limit() {
        let mut incoming = queue(&encode(b"0123456789"));
        let mut outgoing = ByteQueue::new();

        let result = process_frames(0, &mut incoming, &mut outgoing, 8);

        assert!(matches!(
            result,
            ProcessResult::Error {
                frames: 0,
                error: FrameError::TooLarge { length: 10, max: 8 }
            }
        ));
        assert!(outgoing.is_empty());
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview(b"ping"), "ping");
        let long = vec![b'a'; 100];
        let shown = preview(&long);
        assert_eq!(shown.len(), PREVIEW_LEN + 3);
        assert!(shown.ends_with("..."));
    }
}
