//! Test utilities.
//!
//! - [`builders`] - AMQP and Kafka wire frames
//! - [`DissectHarness`] - registry, tap and pipeline wired to a [`CollectingSink`]
//! - [`MockUpstream`] - a scripted Kafka server for relay tests
//!
//! # Example
//!
//! ```rust,ignore
//! use protoscope_core::testing::{builders, DissectHarness};
//!
//! #[tokio::test]
//! async fn test_queue_declare() {
//!     let harness = DissectHarness::new();
//!     let conn = harness.open("amqp").unwrap();
//!     conn.client_bytes(builders::amqp::method(1, declare)).await;
//!     conn.server_bytes(builders::amqp::method(1, declare_ok)).await;
//!     conn.finish().await;
//!     assert_eq!(harness.wait_for(1, Duration::from_secs(1)).await.len(), 1);
//! }
//! ```

pub mod builders;
pub mod harness;
pub mod mock_upstream;
pub mod sink;

pub use harness::{DissectHarness, HarnessBuilder};
pub use mock_upstream::{MockUpstream, ResponseGenerator, UpstreamCall};
pub use sink::CollectingSink;
