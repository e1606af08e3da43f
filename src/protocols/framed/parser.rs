//! Length-prefixed frame parser.

/// Size of the little-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest body a frame may carry (32 MiB).
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// Parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A whole frame sits at the front of the input.
    Complete {
        /// Length of the body.
        body_len: usize,
        /// Header plus body.
        frame_len: usize,
    },
    /// Need more data for the header or the body.
    Incomplete {
        /// Total bytes required before the frame is complete, if known.
        needed: usize,
    },
    /// Declared body length exceeds the limit.
    TooLarge {
        /// Declared body length.
        length: usize,
    },
}

/// Parse the frame at the front of `input`.
///
/// The length limit is checked as soon as the header is available, so an
/// oversized frame is rejected without waiting for its body.
pub fn parse(input: &[u8], max_body: usize) -> ParseResult {
    let Some(header) = input.first_chunk::<HEADER_LEN>() else {
        return ParseResult::Incomplete {
            needed: HEADER_LEN,
        };
    };

    let length = u32::from_le_bytes(*header) as usize;
    if length > max_body {
        return ParseResult::TooLarge { length };
    }

    let frame_len = HEADER_LEN + length;
    if input.len() < frame_len {
        return ParseResult::Incomplete { needed: frame_len };
    }

    ParseResult::Complete {
        body_len: length,
        frame_len,
    }
}

/// Encode a length prefix.
pub fn encode_header(len: u32) -> [u8; HEADER_LEN] {
    len.to_le_bytes()
}

/// Encode a complete frame carrying `body`.
#[cfg(test)]
pub fn encode(body: &[u8]) -> Vec<u8> {
    let len = u32::try_from(body.len()).expect("test body exceeds u32");
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&encode_header(len));
    frame.extend_from_slice(body);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping() {
        let input = [0x04, 0x00, 0x00, 0x00, b'p', b'i', b'n', b'g'];
        assert_eq!(
            parse(&input, MAX_FRAME_BYTES),
            ParseResult::Complete {
                body_len: 4,
                frame_len: 8
            }
        );
    }

    #[test]
    fn test_incomplete_header() {
        for len in 0..HEADER_LEN {
            assert_eq!(
                parse(&[0u8; 3][..len], MAX_FRAME_BYTES),
                ParseResult::Incomplete { needed: HEADER_LEN }
            );
        }
    }

    #[test]
    fn test_incomplete_body() {
        let input = [0x05, 0x00, 0x00, 0x00, b'h', b'e'];
        assert_eq!(
            parse(&input, MAX_FRAME_BYTES),
            ParseResult::Incomplete { needed: 9 }
        );
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(
            parse(&[0, 0, 0, 0], MAX_FRAME_BYTES),
            ParseResult::Complete {
                body_len: 0,
                frame_len: 4
            }
        );
    }

    #[test]
    fn test_limit_boundary() {
        let at_limit = encode_header(MAX_FRAME_BYTES as u32);
        assert_eq!(
            parse(&at_limit, MAX_FRAME_BYTES),
            ParseResult::Incomplete {
                needed: HEADER_LEN + MAX_FRAME_BYTES
            }
        );

        let over_limit = encode_header(MAX_FRAME_BYTES as u32 + 1);
        assert_eq!(
            parse(&over_limit, MAX_FRAME_BYTES),
            ParseResult::TooLarge {
                length: MAX_FRAME_BYTES + 1
            }
        );
    }

    #[test]
    fn test_only_front_frame_is_parsed() {
        let mut input = encode(b"one");
        input.extend_from_slice(&encode(b"second"));
        assert_eq!(
            parse(&input, MAX_FRAME_BYTES),
            ParseResult::Complete {
                body_len: 3,
                frame_len: 7
            }
        );
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(b"ping"), b"\x04\x00\x00\x00ping");
        assert_eq!(encode_header(0x0102_0304), [0x04, 0x03, 0x02, 0x01]);
    }
}
