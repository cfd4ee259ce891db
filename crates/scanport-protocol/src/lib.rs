//! Scanport Wire Protocol
//!
//! This crate defines the wire protocol spoken between a scanport client and
//! a query-port server, together with the frame layer that carries it.
//!
//! # Wire Format
//!
//! Every message travels as one length-prefixed frame:
//!
//! ```text
//! ┌──────────────────┬─────────────────┬──────────────────────────────┐
//! │ Length (4 bytes) │ Format (1 byte) │ Payload (N bytes)            │
//! │ Big-endian u32   │ 0x00 = postcard │ Serialized message           │
//! └──────────────────┴─────────────────┴──────────────────────────────┘
//! ```
//!
//! The length covers the format byte plus the payload. Frames larger than
//! the codec's configured maximum payload are rejected on both the send and
//! the receive path, so a misbehaving peer cannot make the client buffer an
//! arbitrarily large frame.
//!
//! # Protocol Shape
//!
//! ```text
//! ---> Request                 ---> Request
//!      <--- Response                <--- Response
//!      <--- Response                <--- Response
//!      ...                     ---> EndStream
//!      <--- StreamEnd               <--- Response (residue)
//!                                   <--- StreamEnd
//! ```
//!
//! A request opens a stream of zero or more responses terminated by a
//! [`Response::StreamEnd`] marker. A client that loses interest sends
//! [`Request::EndStream`] and drains until the marker arrives, so the server
//! always observes either full consumption or an explicit end-stream.
//!
//! # Protocol Stability
//!
//! The enum variant order is significant for postcard serialization. Changes
//! to variant order will break wire compatibility with existing peers.

mod error;
mod messages;
pub mod serde_utils;
mod wire;

pub use error::{ProtocolError, Result};
pub use messages::{Inclusion, IndexEntry, IndexStats, Request, Response, ScanRange, Span};
pub use wire::FrameCodec;

/// Wire format identifier carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WireFormat {
    /// Postcard format (Rust-native)
    #[default]
    Postcard = 0x00,
}

impl WireFormat {
    /// Parse format from byte
    #[inline]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Postcard),
            _ => None,
        }
    }

    /// Convert to byte
    #[inline]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}
