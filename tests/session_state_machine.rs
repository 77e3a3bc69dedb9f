use std::sync::Arc;
use std::time::Duration;

use realtime_asr_relay::capture::ScriptedDevice;
use realtime_asr_relay::session::{SessionController, SessionError, SessionOptions, SessionState};
use realtime_asr_relay::transcript::RecognitionEvent;
use realtime_asr_relay::transport::InMemoryConnector;

fn options(max_reconnect_attempts: u32, reconnect_delay_ms: u64) -> SessionOptions {
    SessionOptions {
        relay_url: "mem://relay".to_string(),
        chunk_cadence_ms: 5,
        max_reconnect_attempts,
        reconnect_delay_ms,
        connect_timeout_ms: 1000,
        audio_mime: "audio/webm;codecs=opus".to_string(),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn streams_chunks_and_merges_recognition_events() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller = SessionController::new(options(2, 20), device.clone(), connector);

    controller.start().unwrap();
    let mut peer = peers.recv().await.expect("connection established");

    for _ in 0..4 {
        assert!(peer.next_frame().await.is_some());
    }
    assert!(device.is_held());

    for event in [
        RecognitionEvent::interim("привет"),
        RecognitionEvent::interim("привет как"),
        RecognitionEvent::final_result("привет как дела"),
    ] {
        peer.send_text(serde_json::to_string(&event).unwrap())
            .await
            .unwrap();
    }

    wait_until(|| controller.transcript_lines().iter().any(|line| line.is_final)).await;
    let lines = controller.transcript_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].is_final);
    assert_eq!(lines[0].text, "привет как дела");

    controller.stop().await;
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!device.is_held());
}

#[tokio::test]
async fn permission_denial_surfaces_without_connecting() {
    let device = Arc::new(ScriptedDevice::new());
    device.deny_permission();
    let (connector, _peers) = InMemoryConnector::new();
    let mut controller =
        SessionController::new(options(2, 20), device.clone(), connector.clone());

    controller.start().unwrap();
    let err = controller.wait().await.unwrap_err();

    assert!(matches!(err, SessionError::PermissionDenied));
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(connector.attempts(), 0);
    assert!(!device.is_held());
}

#[tokio::test]
async fn initial_connect_failure_is_not_retried() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, _peers) = InMemoryConnector::new();
    connector.refuse_next(1);
    let mut controller =
        SessionController::new(options(5, 10), device.clone(), connector.clone());

    controller.start().unwrap();
    let err = controller.wait().await.unwrap_err();

    assert!(matches!(err, SessionError::ConnectFailed { .. }));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(controller.state(), SessionState::Idle);
    // 権限取得後に失敗してもデバイスは解放される
    assert!(!device.is_held());
}

#[tokio::test]
async fn reconnect_exhaustion_after_unexpected_closes() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller =
        SessionController::new(options(2, 10), device.clone(), connector.clone());

    controller.start().unwrap();
    let mut peer = peers.recv().await.expect("connection established");
    assert!(peer.next_frame().await.is_some());
    assert_eq!(connector.attempts(), 1);

    // 以後の再接続をすべて拒否して切断する
    connector.refuse_next(8);
    peer.close();

    let err = controller.wait().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::ReconnectExhausted { attempts: 2 }
    ));
    // ちょうど2回の再接続試行が観測される
    assert_eq!(connector.attempts(), 3);
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!device.is_held());

    // 以後の停止は何度呼んでも何も起きない
    controller.stop().await;
    controller.stop().await;
}

#[tokio::test]
async fn attempt_counter_resets_on_successful_reconnect() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller = SessionController::new(options(1, 10), device.clone(), connector);

    controller.start().unwrap();
    let mut first = peers.recv().await.expect("first connection");
    assert!(first.next_frame().await.is_some());
    first.close();

    let mut second = peers.recv().await.expect("second connection");
    assert!(second.next_frame().await.is_some());
    second.close();

    // 上限1でも成功のたびにカウンタが戻るため3本目が張られる
    let mut third = peers.recv().await.expect("third connection");
    assert!(third.next_frame().await.is_some());

    controller.stop().await;
    assert!(!device.is_held());
}

#[tokio::test]
async fn device_loss_mid_stream_does_not_reconnect() {
    let device = Arc::new(ScriptedDevice::new());
    device.push_block(vec![0_u8; 320]);
    device.push_loss("device revoked");
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller =
        SessionController::new(options(5, 10), device.clone(), connector.clone());

    controller.start().unwrap();
    let mut peer = peers.recv().await.expect("connection established");
    assert!(peer.next_frame().await.is_some());

    let err = controller.wait().await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceLost { .. }));
    // デバイス喪失は再接続の対象外
    assert_eq!(connector.attempts(), 1);
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!device.is_held());
    // 中継側から見てもチャネルは閉じている
    assert!(peer.next_frame().await.is_none());
}

#[tokio::test]
async fn stop_during_reconnect_gap_is_clean() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller =
        SessionController::new(options(3, 5_000), device.clone(), connector.clone());

    controller.start().unwrap();
    let mut peer = peers.recv().await.expect("connection established");
    assert!(peer.next_frame().await.is_some());

    connector.refuse_next(8);
    peer.close();
    // 再接続待機に入るのを待ってから停止
    let mut states = controller.state_updates();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow() == SessionState::Reconnecting {
                break;
            }
            states.changed().await.unwrap();
        }
    })
    .await
    .expect("reconnecting state not reached");

    controller.stop().await;
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!device.is_held());
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, mut peers) = InMemoryConnector::new();
    let mut controller = SessionController::new(options(2, 20), device.clone(), connector);

    controller.start().unwrap();
    let mut peer = peers.recv().await.expect("connection established");
    assert!(peer.next_frame().await.is_some());

    assert!(controller.start().is_err());

    controller.stop().await;
    // 停止後の再開は許される
    controller.start().unwrap();
    assert!(peers.recv().await.is_some());
    controller.stop().await;
}

#[tokio::test]
async fn stop_before_start_is_a_noop() {
    let device = Arc::new(ScriptedDevice::new());
    let (connector, _peers) = InMemoryConnector::new();
    let mut controller = SessionController::new(options(2, 20), device.clone(), connector);

    controller.stop().await;
    controller.stop().await;
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!device.is_held());
}
