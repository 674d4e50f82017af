//! Utilities for exercising a [`SyncGateway`](replygate::SyncGateway)
//! against the in-memory loopback transport during tests.
//!
//! ```rust
//! use replygate::{Message, loopback::ResponderMode};
//! use replygate_testing::loopback_gateway;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fixture = loopback_gateway(ResponderMode::Echo);
//! let reply = fixture.gateway.exchange(Message::new("ping")).await.unwrap();
//! assert_eq!(reply.payload().as_ref(), b"ping");
//! # }
//! ```

pub mod fixtures;
pub mod logging;
pub mod macros;
pub mod recorder;

pub use fixtures::{
    LoopbackGateway,
    REQUEST_DESTINATION,
    TEST_POLLING_INTERVAL,
    TEST_TIMEOUT,
    echo_gateway,
    loopback_gateway,
    loopback_gateway_with,
    silent_gateway,
};
pub use logging::{LoggerHandle, logger};
pub use recorder::{MetricValues, debugging_recorder, with_recorder};
