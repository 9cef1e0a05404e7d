//! postMessage-style message channels.
//!
//! This is the lowest layer of rpctunnel. A channel moves whole JSON messages
//! in one direction per endpoint with no acknowledgement:
//! - [`MessageChannel::send`] enqueues a message for the other side
//! - [`MessageChannel::on_message`] registers a listener and returns a
//!   [`Subscription`] whose `unsubscribe` is idempotent
//!
//! Two transports are provided:
//! - [`MemoryChannel`] — connected in-process endpoints (hosts, tests)
//! - `StreamChannel` — length-prefixed JSON frames over any async byte
//!   stream (behind the `stream` feature)

pub mod channel;
pub mod codec;
pub mod error;
pub mod memory;

#[cfg(feature = "stream")]
pub mod stream;

pub use channel::{Listeners, MessageChannel, MessageHandler, Subscription};
pub use codec::{
    decode_frame, encode_frame, ChannelConfig, MessageCodec, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{ChannelError, Result};
pub use memory::MemoryChannel;

#[cfg(feature = "stream")]
pub use stream::StreamChannel;
