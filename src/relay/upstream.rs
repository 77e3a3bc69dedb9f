//! 上流ASRプロバイダへの接続と応答の正規化
//!
//! 資格情報はサーバ側で保持し、チャネル確立時にベアラとして一度だけ
//! 送る。クライアントへ渡ることはない。
use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::config::UpstreamConfig;
use crate::transcript::RecognitionEvent;
use crate::transport::{connect_with_request, DuplexChannel, TransportError};

/// 上流接続を開く最小インタフェース（テストではローカルの偽装サーバに差し替え）
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<DuplexChannel, TransportError>;
}

/// ベアラ認証付きWebSocketで実プロバイダへ接続するコネクタ
pub struct ProviderConnector {
    endpoint: String,
    api_key: String,
    connect_timeout: Duration,
}

impl ProviderConnector {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            config.connect_timeout(),
        )
    }
}

#[async_trait]
impl UpstreamConnector for ProviderConnector {
    async fn connect(&self) -> Result<DuplexChannel, TransportError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::connect_failed(e.to_string()))?;

        let credential = format!("Token {}", self.api_key);
        let value = HeaderValue::from_str(&credential)
            .map_err(|_| TransportError::connect_failed("invalid credential header"))?;
        request.headers_mut().insert("Authorization", value);

        connect_with_request(request, self.connect_timeout).await
    }
}

/// プロバイダ固有のJSONから正規化イベントを抽出
///
/// `channel.alternatives[0].transcript` の先頭候補と `is_final` を読む。
/// JSONとして壊れていれば `Err`、構造が合わない・認識結果が空なら
/// `Ok(None)`（どちらも転送しない）。
pub fn parse_provider_message(text: &str) -> Result<Option<RecognitionEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(extract_event(&value))
}

fn extract_event(value: &serde_json::Value) -> Option<RecognitionEvent> {
    let transcript = value
        .get("channel")?
        .get("alternatives")?
        .get(0)?
        .get("transcript")?
        .as_str()?;
    if transcript.is_empty() {
        return None;
    }

    let is_final = value
        .get("is_final")
        .and_then(|flag| flag.as_bool())
        .unwrap_or(false);

    Some(RecognitionEvent {
        transcript: transcript.to_string(),
        is_final,
    })
}
