//! Correlation client tests against the mock middleware.
//!
//! Covers reply routing, push events, stale replies, timeouts, disconnects
//! and reconnection.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{MockMiddleware, WAIT, call_cmd_id, next_request, version_only, wait_for};
use proptest::prelude::*;
use serde_json::Value;
use tokio::net::TcpListener;
use xtx_client::{Action, Client, ConnectionStatus, Error, Method, PushKind};

/// A local port with nothing listening on it.
async fn dead_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

async fn connected(mock: &MockMiddleware) -> Result<Client> {
    let client = mock.client_builder().build()?;
    client.connect().await;
    client.wait_connected(WAIT).await?;
    Ok(client)
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_call_resolves_with_raw_ret_val() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let mut requests = mock.watch_requests();
    let client = connected(&mock).await?;

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call(Method::GetUserList, ()).await });

    let request = next_request(&mut requests, "SOF_GetUserList").await;
    assert!(request.get("param_1").is_none());
    mock.reply(&call_cmd_id(&request), "alice||12345&&&");

    let ret_val = call.await??;
    assert_eq!(ret_val, "alice||12345&&&");
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_outbound_frame_flattens_params() -> Result<()> {
    let mock = MockMiddleware::start(Arc::new(|_: &str, _: &Value| Some("true".to_string()))).await;
    let mut requests = mock.watch_requests();
    let client = connected(&mock).await?;

    client.change_user_pin("cert-1", "111111", "222222").await?;
    let request = next_request(&mut requests, "SOF_ChangePassWd").await;
    assert_eq!(request["param_1"], "cert-1");
    assert_eq!(request["param_2"], "111111");
    assert_eq!(request["param_3"], "222222");
    assert!(request.get("param_4").is_none());

    client.gen_random(Some(16)).await?;
    let request = next_request(&mut requests, "SOF_GenRandom").await;
    assert_eq!(request["param_1"], 16);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_callers() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let mut requests = mock.watch_requests();
    let client = connected(&mock).await?;

    let mut calls = Vec::new();
    for n in 0..3_u32 {
        let caller = client.clone();
        calls.push(tokio::spawn(async move {
            caller.call(Method::SignData, vec![format!("cert-{n}")]).await
        }));
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(next_request(&mut requests, "SOF_SignData").await);
    }

    for request in received.iter().rev() {
        let cert = request["param_1"].as_str().expect("param_1");
        mock.reply(&call_cmd_id(request), &format!("signed-{cert}"));
    }

    for (n, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await??, format!("signed-cert-{n}"));
    }
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

// ============================================================================
// Push & Stale Frames
// ============================================================================

#[tokio::test]
async fn test_push_event_reaches_subscribers() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = connected(&mock).await?;
    let mut first = client.subscribe();
    let mut second = client.subscribe();

    mock.push("usbkeyChange", "insert");

    for events in [&mut first, &mut second] {
        let event = wait_for(events, Action::Push(PushKind::UsbkeyChange)).await;
        assert_eq!(event.action.as_str(), "usbkeyChange");
        assert_eq!(event.ret_val(), Some("insert"));
        assert!(event.msg_id.is_none());
    }
    assert_eq!(client.pending_count(), 0);

    mock.push("onSomethingElse", "x");
    let event = wait_for(&mut first, Action::Push(PushKind::Unknown)).await;
    assert_eq!(event.action.as_str(), "unknownEvent");
    assert_eq!(event.payload.expect("payload").call_cmd_id, "onSomethingElse");
    Ok(())
}

#[tokio::test]
async fn test_stale_reply_yields_exactly_one_event() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = connected(&mock).await?;
    let mut events = client.subscribe();

    mock.reply("999", "nobody asked");
    mock.push("debugChange", "sentinel");

    let mut stale = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event");
            match event.action {
                Action::InvalidReply => stale.push(event),
                Action::Push(PushKind::DebugChange) => break,
                _ => {}
            }
        }
    })
    .await?;

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].msg_id.map(|id| id.get()), Some(999));
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = connected(&mock).await?;
    let mut events = client.subscribe();

    mock.send_raw("this is not json");
    let event = wait_for(&mut events, Action::InvalidFrame).await;
    assert!(event.message.is_some());

    assert!(client.is_connected());
    assert_eq!(client.get_version().await?, "2.14");
    Ok(())
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_call_while_disconnected_is_not_queued() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = mock.client_builder().build()?;

    let err = client.call(Method::GetUserList, ()).await.unwrap_err();
    assert!(matches!(err, Error::NoConnection));
    assert_eq!(client.pending_count(), 0);

    client.connect().await;
    client.wait_connected(WAIT).await?;
    assert_eq!(client.get_version().await?, "2.14");

    assert_eq!(mock.count("SOF_GetUserList"), 0);
    Ok(())
}

#[tokio::test]
async fn test_timeout_then_late_reply_is_stale() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let mut requests = mock.watch_requests();
    let client = mock
        .client_builder()
        .call_timeout(Duration::from_millis(200))
        .build()?;
    client.connect().await;
    client.wait_connected(WAIT).await?;
    let mut events = client.subscribe();

    let err = client.sign_data("cert-1", "payload").await.unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        err,
        Error::CallTimeout {
            method: Method::SignData,
            timeout_ms: 200,
            ..
        }
    ));
    assert_eq!(client.pending_count(), 0);
    wait_for(&mut events, Action::Exception).await;

    let request = next_request(&mut requests, "SOF_SignData").await;
    mock.reply(&call_cmd_id(&request), "too late");

    let stale = wait_for(&mut events, Action::InvalidReply).await;
    assert_eq!(stale.ret_val(), Some("too late"));
    assert!(client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_drop_mid_call_abandons_then_recovers() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let mut requests = mock.watch_requests();
    let client = connected(&mock).await?;
    let mut events = client.subscribe();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.sign_data("cert-1", "payload").await });
    next_request(&mut requests, "SOF_SignData").await;

    mock.drop_connection();

    let err = call.await?.unwrap_err();
    assert!(matches!(err, Error::CallAbandoned { .. }));
    wait_for(&mut events, Action::Disconnected).await;
    wait_for(&mut events, Action::Reconnecting).await;
    wait_for(&mut events, Action::Connected).await;

    client.wait_connected(WAIT).await?;
    assert_eq!(client.get_version().await?, "2.14");
    assert_eq!(mock.connections(), 2);
    Ok(())
}

#[tokio::test]
async fn test_lost_socket_retries_the_port_that_worked() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let dead = dead_port().await?;

    // One attempt: recovery only works if the live port is retried first.
    let client = mock
        .client_builder()
        .ports([mock.port(), dead])
        .reconnect_attempts(1)
        .build()?;
    client.connect().await;
    client.wait_connected(WAIT).await?;
    let mut events = client.subscribe();

    mock.drop_connection();
    wait_for(&mut events, Action::Disconnected).await;
    let connected = wait_for(&mut events, Action::Connected).await;
    assert!(connected.message.expect("url").contains(&mock.port().to_string()));

    client.wait_connected(WAIT).await?;
    assert_eq!(client.get_version().await?, "2.14");
    assert_eq!(mock.connections(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rotation_reaches_a_later_port() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let dead = dead_port().await?;

    let client = mock
        .client_builder()
        .ports([dead, mock.port()])
        .reconnect_attempts(2)
        .build()?;
    let mut events = client.subscribe();
    client.connect().await;

    let connecting = tokio::time::timeout(WAIT, events.recv()).await??;
    assert_eq!(connecting.action, Action::Connecting);
    assert!(connecting.message.expect("url").contains(&dead.to_string()));

    client.wait_connected(WAIT).await?;
    let connected = wait_for(&mut events, Action::Connected).await;
    assert!(connected.message.expect("url").contains(&mock.port().to_string()));
    assert_eq!(client.get_version().await?, "2.14");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_reconnection_refuses_calls() -> Result<()> {
    let port = dead_port().await?;

    let client = Client::builder()
        .port(port)
        .reconnect_attempts(3)
        .reconnect_interval(Duration::from_millis(10))
        .build()?;

    let mut events = client.subscribe();
    client.connect().await;

    let err = client.wait_connected(WAIT).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionRefused { .. }));
    assert_eq!(client.status(), ConnectionStatus::Failed);

    let closed = wait_for(&mut events, Action::SocketClosedWithException).await;
    assert!(closed.message.is_some());

    let err = client.get_version().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionRefused { attempts: 3 }));
    Ok(())
}

#[tokio::test]
async fn test_disconnect_abandons_pending_calls() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let mut requests = mock.watch_requests();
    let client = connected(&mock).await?;
    let mut events = client.subscribe();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.verify_user_pin("cert-1", "0000").await });
    next_request(&mut requests, "SOF_Login").await;

    client.disconnect().await;

    assert!(matches!(
        call.await?.unwrap_err(),
        Error::CallAbandoned { .. }
    ));
    wait_for(&mut events, Action::SocketClosed).await;
    wait_for(&mut events, Action::Disconnected).await;
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        client.get_version().await.unwrap_err(),
        Error::NoConnection
    ));
    Ok(())
}

// ============================================================================
// Keep-alive
// ============================================================================

#[tokio::test]
async fn test_keep_alive_once_when_interval_zero() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = mock
        .client_builder()
        .keep_alive_interval(Duration::ZERO)
        .build()?;
    let mut events = client.subscribe();

    client.connect().await;
    client.wait_connected(WAIT).await?;
    wait_for(&mut events, Action::Recv).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(mock.count("SOF_GetVersion"), 1);
    Ok(())
}

#[tokio::test]
async fn test_keep_alive_repeats_at_interval() -> Result<()> {
    let mock = MockMiddleware::start(version_only()).await;
    let client = mock
        .client_builder()
        .keep_alive_interval(Duration::from_millis(100))
        .build()?;

    client.connect().await;
    client.wait_connected(WAIT).await?;
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert!(mock.count("SOF_GetVersion") >= 3);
    client.disconnect().await;
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_replies_route_to_their_callers(order in Just((0..6_usize).collect::<Vec<_>>()).prop_shuffle()) {
        let outcome: Result<()> = tokio_test::block_on(async {
            let mock = MockMiddleware::start(version_only()).await;
            let mut requests = mock.watch_requests();
            let client = connected(&mock).await?;

            let calls: Vec<_> = (0..order.len())
                .map(|n| {
                    let caller = client.clone();
                    tokio::spawn(async move { caller.call(Method::GetCertEntity, format!("cert-{n}")).await })
                })
                .collect();

            let mut received = Vec::new();
            for _ in 0..order.len() {
                received.push(next_request(&mut requests, "SOF_GetCertEntity").await);
            }

            for &index in &order {
                let request = &received[index];
                let cert = request["param_1"].as_str().expect("param_1");
                mock.reply(&call_cmd_id(request), &format!("entity-of-{cert}"));
            }

            for (n, call) in calls.into_iter().enumerate() {
                anyhow::ensure!(call.await?? == format!("entity-of-cert-{n}"));
            }
            anyhow::ensure!(client.pending_count() == 0);
            Ok(())
        });

        prop_assert!(outcome.is_ok(), "{:?}", outcome);
    }
}
