//! Steps for `sync_gateway` behavioural tests.
use cucumber::{given, then, when};
use replygate::{GatewayError, loopback::ResponderMode};

use crate::worlds::{GatewayWorld, REQUEST_PAYLOAD};

#[given(expr = "a gateway with timeout {int} ms and polling interval {int} ms")]
fn given_gateway(world: &mut GatewayWorld, timeout_ms: u64, interval_ms: u64) {
    world.configure(timeout_ms, interval_ms);
}

#[given(expr = "the remote party echoes after {int} ms")]
fn given_echo(world: &mut GatewayWorld, delay_ms: u64) {
    world.set_responder(ResponderMode::Echo, delay_ms);
}

#[given("the remote party never answers")]
fn given_silent(world: &mut GatewayWorld) { world.set_responder(ResponderMode::Silent, 0); }

#[given("the remote party answers with the wrong key")]
fn given_mismatch(world: &mut GatewayWorld) { world.set_responder(ResponderMode::Mismatch, 0); }

#[given("the transport rejects sends")]
fn given_rejecting(world: &mut GatewayWorld) { world.reject_sends(); }

#[when("a request is exchanged")]
async fn when_exchanged(world: &mut GatewayWorld) { world.exchange().await; }

#[then("the reply payload is the request payload")]
fn then_echoed(world: &mut GatewayWorld) {
    assert_eq!(world.reply().payload().as_ref(), REQUEST_PAYLOAD.as_bytes());
}

#[then("the exchange times out")]
fn then_timed_out(world: &mut GatewayWorld) { assert!(world.error().is_timeout()); }

#[then(expr = "the exchange times out after {int} check(s)")]
fn then_timed_out_after(world: &mut GatewayWorld, checks: u32) {
    match world.error() {
        GatewayError::ReceiveTimeout { attempts, .. } => assert_eq!(*attempts, checks),
        other => panic!("expected a receive timeout, got {other:?}"),
    }
}

#[then("the exchange fails to send")]
fn then_send_failed(world: &mut GatewayWorld) {
    assert!(matches!(world.error(), GatewayError::Send { .. }));
}

#[then("no ephemeral reply destination remains")]
fn then_no_ephemeral(world: &mut GatewayWorld) {
    assert_eq!(world.fixture().transport.live_ephemeral_count(), 0);
}

#[then("one unclaimed reply is left in the registry")]
fn then_one_unclaimed(world: &mut GatewayWorld) {
    assert_eq!(world.fixture().gateway.registry().len(), 1);
}
