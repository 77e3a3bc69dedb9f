//! クライアントセッションの実行時設定
use std::time::Duration;

use serde::Deserialize;

/// 録音セッションのチャンク周期・再接続ポリシー・音声形式
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRuntimeConfig {
    /// 音声チャンクの産出周期（ミリ秒、正の整数）
    pub chunk_cadence_ms: u64,
    /// 録音中の切断に対する再接続の最大試行回数
    pub max_reconnect_attempts: u32,
    /// 再接続までの固定待機（ミリ秒、指数バックオフは行わない）
    pub reconnect_delay_ms: u64,
    /// キャプチャ音声のMIME/コーデック識別子
    pub audio_mime: String,
    /// 接続確立のタイムアウト（ミリ秒）
    pub connect_timeout_ms: u64,
}

impl SessionRuntimeConfig {
    /// チャンク産出周期
    pub fn chunk_cadence(&self) -> Duration {
        Duration::from_millis(self.chunk_cadence_ms)
    }

    /// 再接続までの固定待機
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// 接続確立のタイムアウト
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
