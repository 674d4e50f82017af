//! Gateway fixtures over [`LoopbackTransport`].

use std::{sync::Arc, time::Duration};

use replygate::{
    SyncGateway,
    SyncGatewayBuilder,
    loopback::{LoopbackTransport, Responder, ResponderMode},
};
use rstest::fixture;

/// Destination the fixtures send requests to.
pub const REQUEST_DESTINATION: &str = "test.request";
/// Default receive timeout used by fixtures.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(1000);
/// Polling interval used by fixtures.
pub const TEST_POLLING_INTERVAL: Duration = Duration::from_millis(10);

/// A gateway together with the broker it talks to.
pub struct LoopbackGateway {
    /// Broker handle for inspection and fault injection.
    pub transport: Arc<LoopbackTransport>,
    /// Gateway under test.
    pub gateway: SyncGateway<LoopbackTransport>,
}

/// Build a gateway whose requests are answered in `mode`.
///
/// # Panics
///
/// Panics if the fixture configuration is rejected.
#[must_use]
pub fn loopback_gateway(mode: ResponderMode) -> LoopbackGateway {
    loopback_gateway_with(Responder::new(mode), |builder| builder)
}

/// Build a gateway answered by `responder`, letting `configure` adjust the
/// builder after the fixture defaults are applied.
///
/// # Panics
///
/// Panics if the resulting configuration is rejected.
#[must_use]
pub fn loopback_gateway_with<F>(responder: Responder, configure: F) -> LoopbackGateway
where
    F: FnOnce(SyncGatewayBuilder<LoopbackTransport>) -> SyncGatewayBuilder<LoopbackTransport>,
{
    let transport = Arc::new(LoopbackTransport::new());
    transport.attach_responder(REQUEST_DESTINATION, responder);
    let builder = SyncGateway::builder(Arc::clone(&transport))
        .name("test-gateway")
        .destination(REQUEST_DESTINATION)
        .timeout(TEST_TIMEOUT)
        .polling_interval(TEST_POLLING_INTERVAL);
    let gateway = configure(builder)
        .build()
        .expect("fixture gateway configuration is valid");
    LoopbackGateway { transport, gateway }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn echo_gateway() -> LoopbackGateway { loopback_gateway(ResponderMode::Echo) }

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn silent_gateway() -> LoopbackGateway { loopback_gateway(ResponderMode::Silent) }
