//! Host transport adapters.
//!
//! The host controller only ever sees a [`ByteLink`]. Async streams (TCP,
//! serial, in-process pipes) are attached through [`stream_link`].

pub mod link;
#[cfg(feature = "serial")]
pub mod serial;
pub mod stream_link;

pub use link::{ByteLink, LoopbackLink};
pub use stream_link::{stream_link, LinkEndpoint, StreamLink};
