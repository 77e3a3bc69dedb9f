//! 中継サーバ（デュプレックスリレー）
//!
//! クライアントのストリーミング接続を受け付け、接続ごとに上流ASRへの
//! 接続を1本だけ開き、音声フレームを下りへ・認識イベントを上りへ
//! 転送する。セッション間で共有する可変状態は持たない。
mod error;
mod pair;
mod upstream;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub use error::RelayError;
pub use pair::RelayPair;
pub use upstream::{parse_provider_message, ProviderConnector, UpstreamConnector};

/// 接続単位のシャドーセッション
///
/// クライアント側のセッションIDとは別の、中継側で採番する台帳。
#[derive(Debug, Clone)]
pub struct ShadowSession {
    pub conn_id: String,
    pub opened_at: DateTime<Utc>,
}

/// 接続受け付けとシャドーセッション台帳を持つハンドラ
#[derive(Clone)]
pub struct RelayHandler {
    connector: Arc<dyn UpstreamConnector>,
    sessions: Arc<RwLock<HashMap<String, ShadowSession>>>,
    teardown_grace: Duration,
}

impl RelayHandler {
    pub fn new(connector: Arc<dyn UpstreamConnector>, teardown_grace: Duration) -> Self {
        Self {
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            teardown_grace,
        }
    }

    /// 現在アクティブなシャドーセッション数
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 受け付けたWebSocket接続を1本処理する
    pub async fn handle_connection<S>(&self, ws_stream: tokio_tungstenite::WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let shadow = ShadowSession {
            conn_id: conn_id.clone(),
            opened_at: Utc::now(),
        };
        self.sessions.write().await.insert(conn_id.clone(), shadow);
        info!(conn_id = %conn_id, "client connection accepted");

        match RelayPair::establish(
            conn_id.clone(),
            ws_stream,
            self.connector.clone(),
            self.teardown_grace,
        )
        .await
        {
            Ok(pair) => pair.run().await,
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "relay pair not established");
            }
        }

        self.sessions.write().await.remove(&conn_id);
        info!(conn_id = %conn_id, "shadow session removed");
    }
}

/// 指定アドレスにバインドして中継サーバを起動
pub async fn bind_and_run(bind_addr: &str, handler: RelayHandler) -> Result<(), RelayError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(RelayError::Bind)?;
    run_with_listener(listener, handler).await
}

/// 既存の`TcpListener`で中継サーバを起動（テストでも使用）
pub async fn run_with_listener(
    listener: TcpListener,
    handler: RelayHandler,
) -> Result<(), RelayError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "relay server listening");
    }

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => return Err(RelayError::Accept(err)),
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => handler.handle_connection(ws_stream).await,
                Err(err) => {
                    warn!(%peer_addr, error = %err, "websocket handshake failed");
                }
            }
        });
    }
}
