//! セッション制御
//!
//! `SessionController` は1録音セッションの所有者。権限要求→接続→
//! ストリーミング→停止のライフサイクルを1本のイベントループで駆動し、
//! 予期しない切断は再接続ポリシーへ委ねる。プロセス全域の共有状態は
//! 持たず、複数セッションが独立に併存できる。
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::capture::{AudioChunk, CaptureDevice, CaptureError, ChunkSource};
use crate::config::SessionRuntimeConfig;
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::transcript::{RecognitionEvent, TranscriptLine, TranscriptReconciler};
use crate::transport::{DuplexChannel, DuplexConnector};

use super::error::SessionError;
use super::state::SessionState;

type ChunkReceiver = mpsc::Receiver<Result<AudioChunk, CaptureError>>;

/// セッション生成時に固定される実行時パラメータ
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub relay_url: String,
    pub chunk_cadence_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub audio_mime: String,
}

impl SessionOptions {
    pub fn from_config(config: &SessionRuntimeConfig, relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            chunk_cadence_ms: config.chunk_cadence_ms,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay_ms: config.reconnect_delay_ms,
            connect_timeout_ms: config.connect_timeout_ms,
            audio_mime: config.audio_mime.clone(),
        }
    }

    fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 1セッションのコントローラ
pub struct SessionController {
    id: String,
    options: SessionOptions,
    connector: Arc<dyn DuplexConnector>,
    source: Arc<Mutex<ChunkSource>>,
    reconciler: Arc<Mutex<TranscriptReconciler>>,
    line_tx: mpsc::UnboundedSender<TranscriptLine>,
    line_rx: Option<mpsc::UnboundedReceiver<TranscriptLine>>,
    state_tx: Arc<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    stop_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<Result<(), SessionError>>>,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        device: Arc<dyn CaptureDevice>,
        connector: Arc<dyn DuplexConnector>,
    ) -> Self {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            options,
            connector,
            source: Arc::new(Mutex::new(ChunkSource::new(device))),
            reconciler: Arc::new(Mutex::new(TranscriptReconciler::new())),
            line_tx,
            line_rx: Some(line_rx),
            state_tx: Arc::new(state_tx),
            state_rx,
            stop_tx: None,
            task: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.id
    }

    /// 現在の状態
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// 状態遷移の購読
    pub fn state_updates(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// 現時点の転写行列のスナップショット
    pub fn transcript_lines(&self) -> Vec<TranscriptLine> {
        self.reconciler.lock().lines().to_vec()
    }

    /// 転写行のストリーム（最初の呼び出しのみ `Some`）
    pub fn take_line_stream(&mut self) -> Option<UnboundedReceiverStream<TranscriptLine>> {
        self.line_rx.take().map(UnboundedReceiverStream::new)
    }

    /// セッションを開始する（既に稼働中なら失敗）
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.task.is_some() {
            return Err(SessionError::from(CaptureError::AlreadyActive));
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let driver = Driver {
            session_id: self.id.clone(),
            options: self.options.clone(),
            connector: self.connector.clone(),
            source: self.source.clone(),
            reconciler: self.reconciler.clone(),
            line_tx: self.line_tx.clone(),
            state: self.state_tx.clone(),
            stop_rx,
        };

        info!(
            session_id = %self.id,
            cadence_ms = self.options.chunk_cadence_ms,
            mime = %self.options.audio_mime,
            "session starting"
        );
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(driver.run()));
        Ok(())
    }

    /// 終了を待って結果を受け取る
    pub async fn wait(&mut self) -> Result<(), SessionError> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(err) => Err(SessionError::Internal {
                    message: err.to_string(),
                }),
            },
            None => Ok(()),
        }
    }

    /// セッションを停止する
    ///
    /// どの状態から呼んでも安全で、キャプチャデバイスの解放と
    /// チャネルのクローズを保証する。二重停止は何もしない。
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                debug!(session_id = %self.id, error = %err, "session task join failed");
            }
        }
        // ドライバが異常終了していてもデバイスは解放しておく
        self.source.lock().stop();
    }
}

enum ConnectExit {
    Connected(DuplexChannel),
    Failed(String),
    Stopped,
    DeviceLost(CaptureError),
}

enum StreamExit {
    Stopped,
    Closed,
    DeviceLost(CaptureError),
}

enum WaitExit {
    Elapsed,
    Stopped,
    DeviceLost(CaptureError),
}

struct Driver {
    session_id: String,
    options: SessionOptions,
    connector: Arc<dyn DuplexConnector>,
    source: Arc<Mutex<ChunkSource>>,
    reconciler: Arc<Mutex<TranscriptReconciler>>,
    line_tx: mpsc::UnboundedSender<TranscriptLine>,
    state: Arc<watch::Sender<SessionState>>,
    stop_rx: mpsc::Receiver<()>,
}

impl Driver {
    async fn run(mut self) -> Result<(), SessionError> {
        let policy = self.options.policy();

        self.set_state(SessionState::RequestingPermission);
        let device = self.source.lock().device();
        if let Err(err) = device.request_access().await {
            self.set_state(SessionState::Idle);
            return Err(err.into());
        }

        // 録音中フラグ: 一度ストリーミングへ入ると停止/喪失まで真のまま。
        // 再接続間隙でも真であり続ける（ポリシーの wasRecording 引数）。
        let mut attempt: u32 = 0;
        let mut was_recording = false;
        let mut chunk_rx: Option<ChunkReceiver> = None;

        loop {
            self.set_state(SessionState::Connecting);
            let exit = self.connect_phase(&mut chunk_rx).await;
            match exit {
                ConnectExit::Stopped => return self.finish_stopped(None).await,
                ConnectExit::DeviceLost(err) => {
                    return self.finish_device_lost(None, err).await;
                }
                ConnectExit::Failed(message) => {
                    warn!(session_id = %self.session_id, %message, "connect failed");
                    match policy.decide(attempt, was_recording) {
                        ReconnectDecision::Retry { after } => {
                            self.set_state(SessionState::Reconnecting);
                            attempt += 1;
                            match self.reconnect_wait(after, &mut chunk_rx).await {
                                WaitExit::Elapsed => continue,
                                WaitExit::Stopped => return self.finish_stopped(None).await,
                                WaitExit::DeviceLost(err) => {
                                    return self.finish_device_lost(None, err).await;
                                }
                            }
                        }
                        ReconnectDecision::GiveUp => {
                            self.teardown(None).await;
                            self.set_state(SessionState::Idle);
                            return Err(if was_recording {
                                SessionError::ReconnectExhausted { attempts: attempt }
                            } else {
                                SessionError::ConnectFailed { message }
                            });
                        }
                    }
                }
                ConnectExit::Connected(channel) => {
                    // 接続成功で試行カウンタはリセット
                    attempt = 0;
                    self.set_state(SessionState::Streaming);

                    if chunk_rx.is_none() {
                        // 初回のStreaming遷移でチャンク産出を開始
                        match self.source.lock().start(self.options.chunk_cadence_ms) {
                            Ok(rx) => chunk_rx = Some(rx),
                            Err(err) => {
                                self.teardown(Some(&channel)).await;
                                self.set_state(SessionState::Idle);
                                return Err(err.into());
                            }
                        }
                    }
                    was_recording = true;

                    let exit = match chunk_rx.as_mut() {
                        Some(rx) => self.stream_phase(&channel, rx).await,
                        None => StreamExit::Closed,
                    };
                    match exit {
                        StreamExit::Stopped => {
                            return self.finish_stopped(Some(&channel)).await;
                        }
                        StreamExit::DeviceLost(err) => {
                            return self.finish_device_lost(Some(&channel), err).await;
                        }
                        StreamExit::Closed => {
                            warn!(session_id = %self.session_id, "duplex channel closed unexpectedly");
                            match policy.decide(attempt, true) {
                                ReconnectDecision::Retry { after } => {
                                    self.set_state(SessionState::Reconnecting);
                                    attempt += 1;
                                    match self.reconnect_wait(after, &mut chunk_rx).await {
                                        WaitExit::Elapsed => continue,
                                        WaitExit::Stopped => {
                                            return self.finish_stopped(None).await;
                                        }
                                        WaitExit::DeviceLost(err) => {
                                            return self.finish_device_lost(None, err).await;
                                        }
                                    }
                                }
                                ReconnectDecision::GiveUp => {
                                    self.teardown(Some(&channel)).await;
                                    self.set_state(SessionState::Idle);
                                    return Err(SessionError::ReconnectExhausted {
                                        attempts: attempt,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// 接続確立を待つ。待機中に産出されたチャンクは破棄する
    async fn connect_phase(&mut self, chunk_rx: &mut Option<ChunkReceiver>) -> ConnectExit {
        let connector = self.connector.clone();
        let url = self.options.relay_url.clone();
        let timeout = self.options.connect_timeout();
        let connect = async move {
            match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(Ok(channel)) => Ok(channel),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err("connect timed out".to_string()),
            }
        };
        tokio::pin!(connect);

        enum Input {
            Done(Result<DuplexChannel, String>),
            Stop,
            Chunk(Option<Result<AudioChunk, CaptureError>>),
        }

        loop {
            let input = tokio::select! {
                result = &mut connect => Input::Done(result),
                _ = self.stop_rx.recv() => Input::Stop,
                chunk = next_pending_chunk(chunk_rx) => Input::Chunk(chunk),
            };
            match input {
                Input::Done(Ok(channel)) => return ConnectExit::Connected(channel),
                Input::Done(Err(message)) => return ConnectExit::Failed(message),
                Input::Stop => return ConnectExit::Stopped,
                Input::Chunk(Some(Ok(_))) => {
                    debug!(session_id = %self.session_id, "chunk dropped while connecting");
                }
                Input::Chunk(Some(Err(err))) => return ConnectExit::DeviceLost(err),
                Input::Chunk(None) => *chunk_rx = None,
            }
        }
    }

    /// ストリーミング本体: チャンク転送と認識イベント統合
    async fn stream_phase(
        &mut self,
        channel: &DuplexChannel,
        chunk_rx: &mut ChunkReceiver,
    ) -> StreamExit {
        enum Input {
            Stop,
            Chunk(Option<Result<AudioChunk, CaptureError>>),
            Message(Option<String>),
        }

        loop {
            let input = tokio::select! {
                _ = self.stop_rx.recv() => Input::Stop,
                chunk = chunk_rx.recv() => Input::Chunk(chunk),
                message = channel.next_message() => Input::Message(message),
            };
            match input {
                Input::Stop => return StreamExit::Stopped,
                Input::Chunk(Some(Ok(chunk))) => {
                    // 開いているときのみ送信。閉じていれば黙って破棄
                    if channel.is_open() {
                        if let Err(err) = channel.send_frame(chunk.data).await {
                            debug!(session_id = %self.session_id, error = %err, "chunk dropped");
                        }
                    } else {
                        debug!(session_id = %self.session_id, "chunk dropped while channel closed");
                    }
                }
                Input::Chunk(Some(Err(err))) => return StreamExit::DeviceLost(err),
                Input::Chunk(None) => {
                    return StreamExit::DeviceLost(CaptureError::device_lost(
                        "chunk production ended",
                    ))
                }
                Input::Message(Some(text)) => self.handle_message(&text),
                Input::Message(None) => return StreamExit::Closed,
            }
        }
    }

    /// 再接続までの固定待機。間隙の音声はバッファせず失われる
    async fn reconnect_wait(
        &mut self,
        after: Duration,
        chunk_rx: &mut Option<ChunkReceiver>,
    ) -> WaitExit {
        let delay = tokio::time::sleep(after);
        tokio::pin!(delay);

        enum Input {
            Elapsed,
            Stop,
            Chunk(Option<Result<AudioChunk, CaptureError>>),
        }

        loop {
            let input = tokio::select! {
                _ = &mut delay => Input::Elapsed,
                _ = self.stop_rx.recv() => Input::Stop,
                chunk = next_pending_chunk(chunk_rx) => Input::Chunk(chunk),
            };
            match input {
                Input::Elapsed => return WaitExit::Elapsed,
                Input::Stop => return WaitExit::Stopped,
                Input::Chunk(Some(Ok(_))) => {
                    debug!(session_id = %self.session_id, "chunk dropped during reconnect gap");
                }
                Input::Chunk(Some(Err(err))) => return WaitExit::DeviceLost(err),
                Input::Chunk(None) => *chunk_rx = None,
            }
        }
    }

    fn handle_message(&self, text: &str) {
        match serde_json::from_str::<RecognitionEvent>(text) {
            Ok(event) => {
                let line = self.reconciler.lock().apply(&event);
                if let Some(line) = line {
                    let _ = self.line_tx.send(line);
                }
            }
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "malformed recognition event");
            }
        }
    }

    async fn finish_stopped(&self, channel: Option<&DuplexChannel>) -> Result<(), SessionError> {
        self.set_state(SessionState::Stopping);
        self.teardown(channel).await;
        self.set_state(SessionState::Idle);
        info!(session_id = %self.session_id, "session stopped");
        Ok(())
    }

    async fn finish_device_lost(
        &self,
        channel: Option<&DuplexChannel>,
        err: CaptureError,
    ) -> Result<(), SessionError> {
        // デバイス喪失は再接続せず後始末のみ
        self.teardown(channel).await;
        self.set_state(SessionState::Idle);
        Err(err.into())
    }

    /// 後始末: 産出停止・デバイス解放・チャネルクローズ
    async fn teardown(&self, channel: Option<&DuplexChannel>) {
        self.source.lock().stop();
        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(session_id = %self.session_id, state = %state, "session state");
        self.state.send_replace(state);
    }
}

/// 産出が止まっている間は永久に保留するチャンク受信
async fn next_pending_chunk(
    rx: &mut Option<ChunkReceiver>,
) -> Option<Result<AudioChunk, CaptureError>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
