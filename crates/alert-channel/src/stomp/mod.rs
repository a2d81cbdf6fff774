//! Minimal STOMP 1.2 client codec.
//!
//! Covers what a subscriber needs: building `CONNECT`, `SUBSCRIBE`,
//! `UNSUBSCRIBE` and `DISCONNECT` frames, decoding `CONNECTED`, `MESSAGE`,
//! `RECEIPT` and `ERROR` frames, EOL heartbeats and heart-beat negotiation.
//! Header escaping follows the
//! [STOMP 1.2 specification](https://stomp.github.io/stomp-specification-1.2.html#Value_Encoding).

pub(crate) mod constants;
pub mod frame;
pub mod heartbeat;
pub mod parser;

pub use frame::{Command, Frame};
pub use heartbeat::Heartbeat;
pub use parser::{Decoded, FrameDecoder};
