//! Ephemeral reply destinations are deleted exactly once on every path.

use std::time::Duration;

use replygate::{DestinationError, GatewayError, Message};
use replygate_testing::{
    LoggerHandle,
    LoopbackGateway,
    echo_gateway,
    logger,
    receive_expect,
    send_expect,
    silent_gateway,
};
use rstest::rstest;
use serial_test::serial;

mod common;
use common::TestResult;

/// Let background deletions spawned by drop guards run.
async fn settle_drops(gateway: &LoopbackGateway, expected: usize) {
    for _ in 0..20 {
        if gateway.transport.deleted().len() >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[rstest]
#[tokio::test]
async fn completed_exchange_deletes_once(echo_gateway: LoopbackGateway) -> TestResult {
    let mut handle = send_expect!(echo_gateway.gateway.send(Message::new("ping")));
    receive_expect!(echo_gateway.gateway.receive_default(&mut handle));
    drop(handle);
    settle_drops(&echo_gateway, 2).await;

    let deleted = echo_gateway.transport.deleted();
    assert_eq!(deleted.len(), 1);
    assert_eq!(echo_gateway.transport.live_ephemeral_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timed_out_exchange_deletes_once(silent_gateway: LoopbackGateway) {
    let mut handle = send_expect!(silent_gateway.gateway.send(Message::new("ping")));
    let err = silent_gateway
        .gateway
        .receive(&mut handle, Duration::from_millis(50))
        .await
        .expect_err("nobody answers");
    assert!(err.is_timeout());
    drop(handle);
    settle_drops(&silent_gateway, 2).await;

    assert_eq!(silent_gateway.transport.deleted().len(), 1);
    assert_eq!(silent_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test]
async fn send_failure_releases_the_destination(echo_gateway: LoopbackGateway) {
    echo_gateway.transport.fail_send(true);

    let err = echo_gateway
        .gateway
        .send(Message::new("ping"))
        .await
        .expect_err("send rejected");

    assert!(matches!(err, GatewayError::Send { .. }));
    assert_eq!(echo_gateway.transport.created_count(), 1);
    assert_eq!(echo_gateway.transport.deleted().len(), 1);
    assert_eq!(echo_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test]
async fn listen_failure_releases_the_destination_and_sends_nothing(
    echo_gateway: LoopbackGateway,
) {
    echo_gateway.transport.fail_listen(true);

    let err = echo_gateway
        .gateway
        .send(Message::new("ping"))
        .await
        .expect_err("listen rejected");

    assert!(matches!(
        err,
        GatewayError::Destination {
            source: DestinationError::Listen { .. },
            ..
        }
    ));
    assert!(echo_gateway.transport.sent().is_empty());
    assert_eq!(echo_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test]
async fn create_failure_sends_nothing(echo_gateway: LoopbackGateway) {
    echo_gateway.transport.fail_create(true);

    let err = echo_gateway
        .gateway
        .send(Message::new("ping"))
        .await
        .expect_err("create rejected");

    assert!(matches!(
        err,
        GatewayError::Destination {
            source: DestinationError::Create(_),
            ..
        }
    ));
    assert!(echo_gateway.transport.sent().is_empty());
    assert!(echo_gateway.transport.deleted().is_empty());
}

#[rstest]
#[tokio::test]
async fn closing_a_handle_deletes_once(silent_gateway: LoopbackGateway) -> TestResult {
    let handle = send_expect!(silent_gateway.gateway.send(Message::new("ping")));

    handle.close().await?;
    settle_drops(&silent_gateway, 2).await;

    assert_eq!(silent_gateway.transport.deleted().len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn abandoned_handle_is_deleted_by_its_drop_guard(silent_gateway: LoopbackGateway) {
    let handle = send_expect!(silent_gateway.gateway.send(Message::new("ping")));
    let destination = handle.reply_destination().destination().clone();

    drop(handle);
    settle_drops(&silent_gateway, 1).await;

    assert_eq!(silent_gateway.transport.deleted(), vec![destination]);
    assert_eq!(silent_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancelled_receive_still_deletes_once(silent_gateway: LoopbackGateway) {
    let mut handle = send_expect!(silent_gateway.gateway.send(Message::new("ping")));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        silent_gateway
            .gateway
            .receive(&mut handle, Duration::from_secs(5)),
    )
    .await;
    assert!(cancelled.is_err(), "receive should still be waiting");
    drop(handle);
    settle_drops(&silent_gateway, 2).await;

    assert_eq!(silent_gateway.transport.deleted().len(), 1);
    assert_eq!(silent_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn receive_cancelled_mid_delete_still_deletes(silent_gateway: LoopbackGateway) {
    silent_gateway.transport.slow_delete(Duration::from_millis(100));
    let mut handle = send_expect!(silent_gateway.gateway.send(Message::new("ping")));

    // The receive times out at 50 ms and is dropped while its delete runs.
    let cancelled = tokio::time::timeout(
        Duration::from_millis(80),
        silent_gateway
            .gateway
            .receive(&mut handle, Duration::from_millis(50)),
    )
    .await;
    assert!(cancelled.is_err(), "delete should still be in flight");
    assert_eq!(silent_gateway.transport.live_ephemeral_count(), 1);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(silent_gateway.transport.created_count(), 1);
    assert_eq!(silent_gateway.transport.live_ephemeral_count(), 0);
}

#[rstest]
#[tokio::test]
#[serial]
async fn delete_failure_is_logged_and_reply_still_returned(
    echo_gateway: LoopbackGateway,
    mut logger: LoggerHandle,
) -> TestResult {
    echo_gateway.transport.fail_delete(true);

    let reply = echo_gateway.gateway.exchange(Message::new("ping")).await?;

    assert_eq!(reply.payload().as_ref(), b"ping");
    let logged = logger.take_matching("error while deleting reply destination");
    assert!(
        logged.iter().any(|(level, _)| *level == log::Level::Error),
        "expected an error record, got {logged:?}"
    );
    Ok(())
}
