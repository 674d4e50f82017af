//! Optional convenience imports for common request/reply workflows.
//!
//! Prefer importing specialised APIs directly from their owning modules.
//!
//! # Examples
//!
//! ```rust,no_run
//! use replygate::prelude::*;
//!
//! async fn ask<T: Transport>(gateway: &SyncGateway<T>) -> Result<Message> {
//!     gateway.exchange(Message::new("ping")).await
//! }
//! ```

pub use crate::{
    correlation::{CorrelationContext, CorrelationKey},
    error::{GatewayError, Result},
    gateway::{ReplyHandle, SyncGateway},
    message::Message,
    transport::{Transport, TransportError},
};
