//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the SBP framing used on every connection:
//! - 4-byte header encoding/decoding (version, code, big-endian length)
//! - Frame struct with typed accessors
//! - Exact-length frame reads from an async stream

mod frame;
mod reader;
mod wire_format;

pub use frame::{encode, Frame};
pub use reader::read_frame;
pub use wire_format::{
    checked_length, Header, ProtocolCode, HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
