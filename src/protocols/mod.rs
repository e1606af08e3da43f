//! Protocol implementations.
//!
//! Parsers here are pure functions over byte slices. The runtime applies them
//! to connection buffers in `runtime::request`.
//!
//! - `framed`: length-prefixed echo protocol

pub mod framed;
