//! 双方向チャネルの抽象
//!
//! クライアント⇄中継サーバ、中継サーバ⇄上流ASRの両区間で使う
//! メッセージ指向の永続接続。バイナリフレーム（音声）を送り、
//! テキストメッセージ（認識イベントJSON）を受け取る。
mod error;
mod in_memory;
mod websocket;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

pub use error::TransportError;
pub use in_memory::{duplex_pair, DuplexPeer, InMemoryConnector};
pub use websocket::{connect_with_request, WebSocketConnector};

/// 送信フレーム（バイナリ音声 or 明示クローズ）
#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Binary(Bytes),
    Close,
}

/// 開いた双方向接続へのハンドル
#[derive(Debug)]
pub struct DuplexChannel {
    outbound_tx: mpsc::Sender<OutboundFrame>,
    inbound_rx: RwLock<mpsc::Receiver<String>>,
}

impl DuplexChannel {
    pub(crate) fn new(
        outbound_tx: mpsc::Sender<OutboundFrame>,
        inbound_rx: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            outbound_tx,
            inbound_rx: RwLock::new(inbound_rx),
        }
    }

    /// バイナリフレームを相手側へ送信
    pub async fn send_frame(&self, frame: Bytes) -> Result<(), TransportError> {
        self.outbound_tx
            .send(OutboundFrame::Binary(frame))
            .await
            .map_err(|_| TransportError::Send)
    }

    /// 次のテキストメッセージを待機（`None` はチャネルクローズ）
    pub async fn next_message(&self) -> Option<String> {
        self.inbound_rx.write().await.recv().await
    }

    /// 送信側から見て接続がまだ開いているか
    pub fn is_open(&self) -> bool {
        !self.outbound_tx.is_closed()
    }

    /// 接続を明示的に閉じる
    pub async fn close(&self) {
        let _ = self.outbound_tx.send(OutboundFrame::Close).await;
    }
}

/// 双方向接続を開く最小インタフェース
#[async_trait]
pub trait DuplexConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError>;
}
