//! World types for the behavioural suite.

mod gateway;

pub use gateway::{GatewayWorld, REQUEST_PAYLOAD};
