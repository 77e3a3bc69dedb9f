//! 上流ASRプロバイダへの接続設定
use std::time::Duration;

use serde::Deserialize;

/// 上流ASRサービスのエンドポイントと資格情報
///
/// `api_key` はサーバ保持の秘匿値。クライアントへは一切渡さず、
/// 環境変数 `ASR_RELAY_UPSTREAM_KEY` があればそちらを優先する。
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout_ms: u64,
}

impl UpstreamConfig {
    /// 上流接続確立のタイムアウト（ミリ秒→Duration）
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
