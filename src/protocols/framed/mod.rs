//! Length-prefixed echo protocol.
//!
//! The only protocol this server speaks. Every message is a frame:
//!
//! ```text
//! +----------------------+----------------------+
//! | length: u32 (LE)     | body: length bytes   |
//! +----------------------+----------------------+
//! ```
//!
//! The server answers each frame with an identical frame. Bodies are opaque.
//!
//! ## Limits
//!
//! A declared length above [`MAX_FRAME_BYTES`] (32 MiB) is a protocol
//! violation: no response is produced for it and the connection is closed
//! once any earlier responses have been flushed. There is no error frame,
//! clients only observe the connection ending.
//!
//! ## Example
//!
//! ```text
//! Request:  04 00 00 00 70 69 6E 67   (length 4, "ping")
//! Response: 04 00 00 00 70 69 6E 67
//! ```

pub mod parser;

#[cfg(test)]
pub use parser::encode;
pub use parser::{encode_header, parse, ParseResult, HEADER_LEN, MAX_FRAME_BYTES};
