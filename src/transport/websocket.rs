//! WebSocket実装の双方向チャネル
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::debug;

use super::{DuplexChannel, DuplexConnector, OutboundFrame, TransportError};

/// `tokio_tungstenite::connect_async` ベースのコネクタ
///
/// 接続確立が時間内に完了しない場合は `ConnectFailed` として扱う
/// （openもerrorも来ないまま保留にはしない）。
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl DuplexConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::connect_failed("connect timed out"))?
            .map_err(|e| TransportError::connect_failed(e.to_string()))?;
        Ok(spawn_channel(ws))
    }
}

/// 認証ヘッダ等を載せたハンドシェイクリクエストで接続（上流プロバイダ用）
pub async fn connect_with_request(
    request: Request,
    connect_timeout: Duration,
) -> Result<DuplexChannel, TransportError> {
    let (ws, _response) = tokio::time::timeout(connect_timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::connect_failed("connect timed out"))?
        .map_err(|e| TransportError::connect_failed(e.to_string()))?;
    Ok(spawn_channel(ws))
}

/// WebSocketストリームをポンプして `DuplexChannel` へ変換
///
/// 送信タスク: バイナリフレームをWS binaryへ、`Close` でWSを閉じる。
/// 受信タスク: WS textを取り込み、close/エラーで受信チャネルを落とす。
pub(crate) fn spawn_channel<S>(ws: WebSocketStream<S>) -> DuplexChannel
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(64);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(64);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                OutboundFrame::Binary(data) => {
                    if ws_tx.send(Message::Binary(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by remote");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "websocket receive failed");
                    break;
                }
                _ => {}
            }
        }
    });

    DuplexChannel::new(outbound_tx, inbound_rx)
}
