//! Network layer of the tap.
//!
//! This module provides:
//! - Half-connection byte streams fed by captured segments
//! - The reader context handed to every dissector
//! - A session runner that contains dissector failures
//! - `ScopeTap`, which starts both halves of a connection
//! - An inline TCP relay that feeds live connections to the tap

pub mod context;
pub mod listener;
pub mod session;
pub mod stream;
pub mod tap;

pub use context::{Emitter, ReaderContext};
pub use listener::TapListener;
pub use session::{run_half, HalfReport};
pub use stream::{half_stream, CaptureClock, HalfStream, Segment, SegmentSender, TimedCodec};
pub use tap::{ConnectionFeed, ConnectionReport, ScopeTap};
