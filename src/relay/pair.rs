//! クライアント⇄上流のペア
//!
//! 受け付けたクライアント接続1本につき上流接続をちょうど1本持ち、
//! どちらが閉じてももう片方を同じハンドラ内で閉じる。解体ルーチンは
//! 1箇所に集約する。
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::transport::{DuplexChannel, TransportError};

use super::upstream::{parse_provider_message, UpstreamConnector};

pub struct RelayPair<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    conn_id: String,
    client: WebSocketStream<S>,
    upstream: DuplexChannel,
    teardown_grace: Duration,
}

impl<S> RelayPair<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    /// クライアント接続に対して上流接続を確立し、ペアを作る
    ///
    /// 確立を待つ間に届いたクライアントの音声フレームはキューせず
    /// 破棄する。確立に失敗した場合はエラー理由付きでクライアントを
    /// 閉じ、中継は始まらない。
    pub async fn establish(
        conn_id: String,
        mut client: WebSocketStream<S>,
        connector: Arc<dyn UpstreamConnector>,
        teardown_grace: Duration,
    ) -> Result<Self, TransportError> {
        let connect = connector.connect();
        tokio::pin!(connect);

        enum Input {
            Upstream(Result<DuplexChannel, TransportError>),
            Client(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
        }

        loop {
            let input = tokio::select! {
                result = &mut connect => Input::Upstream(result),
                message = client.next() => Input::Client(message),
            };
            match input {
                Input::Upstream(Ok(upstream)) => {
                    return Ok(Self {
                        conn_id,
                        client,
                        upstream,
                        teardown_grace,
                    });
                }
                Input::Upstream(Err(err)) => {
                    warn!(conn_id = %conn_id, error = %err, "upstream connect failed");
                    let frame = CloseFrame {
                        code: CloseCode::Error,
                        reason: "upstream connect failed".into(),
                    };
                    let _ = client.close(Some(frame)).await;
                    return Err(err);
                }
                Input::Client(Some(Ok(Message::Binary(_)))) => {
                    // 上流確立前の音声は破棄（キューしない）
                    debug!(conn_id = %conn_id, "client frame dropped before upstream open");
                }
                Input::Client(Some(Ok(Message::Close(_)))) | Input::Client(None) => {
                    info!(conn_id = %conn_id, "client left before upstream open");
                    return Err(TransportError::Closed);
                }
                Input::Client(Some(Err(err))) => {
                    warn!(conn_id = %conn_id, error = %err, "client socket failed");
                    return Err(TransportError::Closed);
                }
                Input::Client(Some(Ok(_))) => {}
            }
        }
    }

    /// 転送ループ: 音声は下り、認識イベントは上り
    pub async fn run(mut self) {
        info!(conn_id = %self.conn_id, "relay pair established");
        let mut frames_forwarded: u64 = 0;

        enum Input {
            Client(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
            Upstream(Option<String>),
        }

        loop {
            let input = tokio::select! {
                message = self.client.next() => Input::Client(message),
                message = self.upstream.next_message() => Input::Upstream(message),
            };
            match input {
                Input::Client(Some(Ok(Message::Binary(data)))) => {
                    // 上流が開いているときだけバイト列をそのまま転送
                    if self.upstream.is_open() {
                        if self.upstream.send_frame(Bytes::from(data)).await.is_ok() {
                            frames_forwarded += 1;
                        }
                    } else {
                        debug!(conn_id = %self.conn_id, "client frame dropped after upstream close");
                    }
                }
                Input::Client(Some(Ok(Message::Close(_)))) | Input::Client(None) => {
                    info!(conn_id = %self.conn_id, "client disconnected");
                    break;
                }
                Input::Client(Some(Err(err))) => {
                    warn!(conn_id = %self.conn_id, error = %err, "client socket failed");
                    break;
                }
                Input::Client(Some(Ok(_))) => {}
                Input::Upstream(Some(text)) => self.relay_upstream_text(&text).await,
                Input::Upstream(None) => {
                    info!(conn_id = %self.conn_id, "upstream closed");
                    break;
                }
            }
        }

        info!(
            conn_id = %self.conn_id,
            frames_forwarded,
            "relay pair finished"
        );
        self.teardown().await;
    }

    /// 上流テキストを検査し、正規化イベントのみクライアントへ送る
    async fn relay_upstream_text(&mut self, text: &str) {
        match parse_provider_message(text) {
            Ok(Some(event)) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                if self.client.send(Message::Text(json)).await.is_err() {
                    debug!(conn_id = %self.conn_id, "client send failed");
                }
            }
            Ok(None) => {
                // 空の認識結果や契約外の構造は転送対象外
            }
            Err(err) => {
                // 壊れた上流ペイロードは記録して破棄。接続は維持する
                warn!(conn_id = %self.conn_id, error = %err, "malformed upstream payload dropped");
            }
        }
    }

    /// 双方を同じティック内で閉じる単一の解体ルーチン
    ///
    /// 片側が応答しなくても猶予時間を超えてもう片側を生かしたままにしない。
    async fn teardown(mut self) {
        let grace = self.teardown_grace;
        let shutdown = async {
            self.upstream.close().await;
            let _ = self.client.close(None).await;
        };
        if tokio::time::timeout(grace, shutdown).await.is_err() {
            warn!(conn_id = %self.conn_id, "teardown exceeded grace period");
        }
        info!(conn_id = %self.conn_id, "relay pair closed");
    }
}
