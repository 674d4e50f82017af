//! Test world state for the request/reply behavioural tests.
//!
//! Collects the gateway settings and remote-party behaviour from `Given`
//! steps, runs one exchange in the `When` step and keeps its outcome for the
//! `Then` steps.

use std::{fmt, time::Duration};

use cucumber::World;
use replygate::{
    GatewayError,
    Message,
    loopback::{Responder, ResponderMode},
};
use replygate_testing::{LoopbackGateway, loopback_gateway_with};

pub const REQUEST_PAYLOAD: &str = "behavioural request";

#[derive(Default, World)]
pub struct GatewayWorld {
    timeout: Duration,
    interval: Duration,
    responder: Option<Responder>,
    reject_sends: bool,
    fixture: Option<LoopbackGateway>,
    outcome: Option<Result<Message, GatewayError>>,
}

impl fmt::Debug for GatewayWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayWorld")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .field("responder", &self.responder)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl GatewayWorld {
    pub fn configure(&mut self, timeout_ms: u64, interval_ms: u64) {
        self.timeout = Duration::from_millis(timeout_ms);
        self.interval = Duration::from_millis(interval_ms);
    }

    pub fn set_responder(&mut self, mode: ResponderMode, delay_ms: u64) {
        self.responder = Some(Responder::new(mode).with_delay(Duration::from_millis(delay_ms)));
    }

    pub fn reject_sends(&mut self) { self.reject_sends = true; }

    pub async fn exchange(&mut self) {
        let responder = self
            .responder
            .clone()
            .unwrap_or_else(|| Responder::new(ResponderMode::Silent));
        let (timeout, interval) = (self.timeout, self.interval);
        let fixture = loopback_gateway_with(responder, |builder| {
            builder.timeout(timeout).polling_interval(interval)
        });
        fixture.transport.fail_send(self.reject_sends);
        self.outcome = Some(fixture.gateway.exchange(Message::new(REQUEST_PAYLOAD)).await);
        self.fixture = Some(fixture);
    }

    pub fn reply(&self) -> &Message {
        match &self.outcome {
            Some(Ok(reply)) => reply,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    pub fn error(&self) -> &GatewayError {
        match &self.outcome {
            Some(Err(e)) => e,
            other => panic!("expected an error, got {other:?}"),
        }
    }

    pub fn fixture(&self) -> &LoopbackGateway {
        self.fixture.as_ref().expect("no exchange was run")
    }
}
