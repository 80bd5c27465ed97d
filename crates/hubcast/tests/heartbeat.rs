//! Heartbeat and reconnect behavior against a scripted peer that accepts
//! sockets but never answers the liveness probe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use hubcast::{CloseReason, LifecycleEvent, PushClient, PushClientOptions};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

/// Accepts WebSocket connections and swallows every inbound frame without
/// ever replying. Plain-HTTP requests (the client's catch-up fetch) fail the
/// handshake and are dropped, which the push client tolerates.
async fn silent_ws_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let sessions = Arc::new(AtomicUsize::new(0));

    let counter = sessions.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let counter = counter.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                while let Some(Ok(frame)) = ws.next().await {
                    if frame.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (format!("http://{addr}"), sessions)
}

async fn next_close(
    events: &mut hubcast::LifecycleReceiver,
    deadline: Duration,
) -> Option<CloseReason> {
    let scan = async {
        loop {
            match events.recv().await {
                Ok(LifecycleEvent::Close(reason)) => return Some(reason),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    };
    tokio::time::timeout(deadline, scan).await.ok().flatten()
}

#[tokio::test]
async fn unanswered_ping_tears_the_session_down() {
    let (base_url, sessions) = silent_ws_server().await;

    let options = PushClientOptions::new("hub_live_test", "ws-1")
        .with_base_url(base_url)
        .with_ping_interval(Duration::from_millis(100))
        .with_pong_timeout(Duration::from_millis(150))
        .with_reconnect_delay(Duration::from_millis(200));
    let mut push = PushClient::new(options).expect("client");

    let mut events = push.subscribe_lifecycle();
    push.connect().await.expect("connect");

    let reason = next_close(&mut events, Duration::from_secs(3))
        .await
        .expect("session never closed");
    assert_eq!(reason, CloseReason::HeartbeatTimeout);
    assert!(sessions.load(Ordering::SeqCst) >= 1);

    push.disconnect().await;
}

#[tokio::test]
async fn reconnect_begins_within_the_fixed_delay() {
    let (base_url, sessions) = silent_ws_server().await;

    let reconnect_delay = Duration::from_millis(200);
    let options = PushClientOptions::new("hub_live_test", "ws-1")
        .with_base_url(base_url)
        .with_ping_interval(Duration::from_millis(100))
        .with_pong_timeout(Duration::from_millis(150))
        .with_reconnect_delay(reconnect_delay);
    let mut push = PushClient::new(options).expect("client");

    let mut events = push.subscribe_lifecycle();
    push.connect().await.expect("connect");

    // First heartbeat death...
    next_close(&mut events, Duration::from_secs(3))
        .await
        .expect("session never closed");

    // ...followed by a fresh session. The scripted peer counts handshakes, so
    // a second session proves the controller reconnected.
    let deadline = tokio::time::Instant::now() + reconnect_delay + Duration::from_secs(2);
    loop {
        if sessions.load(Ordering::SeqCst) >= 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no reconnect attempt after heartbeat death"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    push.disconnect().await;
}

#[tokio::test]
async fn intentional_disconnect_does_not_reconnect() {
    let (base_url, sessions) = silent_ws_server().await;

    let options = PushClientOptions::new("hub_live_test", "ws-1")
        .with_base_url(base_url)
        // Generous heartbeat so the local close happens first.
        .with_ping_interval(Duration::from_secs(30))
        .with_pong_timeout(Duration::from_secs(5))
        .with_reconnect_delay(Duration::from_millis(100));
    let mut push = PushClient::new(options).expect("client");

    let mut events = push.subscribe_lifecycle();
    push.connect().await.expect("connect");

    // Wait until the session is up before tearing it down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while sessions.load(Ordering::SeqCst) < 1 {
        assert!(tokio::time::Instant::now() < deadline, "never connected");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    push.disconnect().await;
    let reason = next_close(&mut events, Duration::from_secs(3))
        .await
        .expect("no close event after disconnect");
    assert_eq!(reason, CloseReason::LocalClose);

    // Give a would-be reconnect time to happen, then confirm it did not.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sessions.load(Ordering::SeqCst), 1);
}
