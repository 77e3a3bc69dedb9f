//! テスト用インメモリ双方向リンク
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{DuplexChannel, DuplexConnector, OutboundFrame, TransportError};

/// インメモリリンクの対向端
///
/// クライアントが送ったフレームを受け取り、テキストメッセージを
/// 注入し、リンクを閉じられる。
pub struct DuplexPeer {
    frame_rx: Option<mpsc::Receiver<OutboundFrame>>,
    text_tx: Option<mpsc::Sender<String>>,
}

impl DuplexPeer {
    /// 次のバイナリフレーム（`None` は相手側クローズ）
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        let rx = self.frame_rx.as_mut()?;
        match rx.recv().await {
            Some(OutboundFrame::Binary(data)) => Some(data),
            Some(OutboundFrame::Close) | None => None,
        }
    }

    /// テキストメッセージを相手側へ注入
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        match &self.text_tx {
            Some(tx) => tx.send(text.into()).await.map_err(|_| TransportError::Send),
            None => Err(TransportError::Closed),
        }
    }

    /// リンクを閉じる（相手側の受信は `None`、送信は失敗になる）
    pub fn close(&mut self) {
        self.frame_rx = None;
        self.text_tx = None;
    }
}

/// 接続済みの `DuplexChannel` と対向端のペアを作る
pub fn duplex_pair(buffer: usize) -> (DuplexChannel, DuplexPeer) {
    let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
    let (text_tx, text_rx) = mpsc::channel(buffer);
    let channel = DuplexChannel::new(outbound_tx, text_rx);
    let peer = DuplexPeer {
        frame_rx: Some(outbound_rx),
        text_tx: Some(text_tx),
    };
    (channel, peer)
}

#[derive(Debug, Clone, Copy)]
enum ScriptedOutcome {
    Refuse,
}

/// 接続試行を記録し、結果をスクリプトできるコネクタ
///
/// 成立した接続ごとに対向端 `DuplexPeer` をテスト側へ引き渡す。
pub struct InMemoryConnector {
    scripted: Mutex<VecDeque<ScriptedOutcome>>,
    peer_tx: mpsc::UnboundedSender<DuplexPeer>,
    attempts: AtomicU32,
}

impl InMemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexPeer>) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            peer_tx,
            attempts: AtomicU32::new(0),
        });
        (connector, peer_rx)
    }

    /// 次の `count` 回の接続試行を失敗させる
    pub fn refuse_next(&self, count: usize) {
        let mut scripted = self.scripted.lock();
        for _ in 0..count {
            scripted.push_back(ScriptedOutcome::Refuse);
        }
    }

    /// これまでの接続試行回数
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DuplexConnector for InMemoryConnector {
    async fn connect(&self, _url: &str) -> Result<DuplexChannel, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.scripted.lock().pop_front().is_some() {
            return Err(TransportError::connect_failed("scripted refusal"));
        }

        let (channel, peer) = duplex_pair(32);
        let _ = self.peer_tx.send(peer);
        Ok(channel)
    }
}
